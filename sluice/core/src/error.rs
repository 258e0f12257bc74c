use crate::{
    catalogue::CatalogueError, compiler::CompileError, config::ConfigError, engine::EngineError,
    materialize::MaterializeError, templating::TemplateError, validation::ValidationError,
};

use miette::Diagnostic;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(Box<ValidationError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(Box<CompileError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Materialize(Box<MaterializeError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(Box<EngineError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalogue(Box<CatalogueError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(Box<TemplateError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(Box<ConfigError>),
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Error::Validation(Box::new(error))
    }
}

impl From<CompileError> for Error {
    fn from(error: CompileError) -> Self {
        Error::Compile(Box::new(error))
    }
}

impl From<MaterializeError> for Error {
    fn from(error: MaterializeError) -> Self {
        Error::Materialize(Box::new(error))
    }
}

impl From<EngineError> for Error {
    fn from(error: EngineError) -> Self {
        Error::Engine(Box::new(error))
    }
}

impl From<CatalogueError> for Error {
    fn from(error: CatalogueError) -> Self {
        Error::Catalogue(Box::new(error))
    }
}

impl From<TemplateError> for Error {
    fn from(error: TemplateError) -> Self {
        Error::Template(Box::new(error))
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Self {
        Error::Config(Box::new(error))
    }
}
