use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::{collections::HashMap, path::Path};

use datafusion::sql::sqlparser::parser::ParserError;
use datafusion::sql::{parser::DFParser, sqlparser::dialect::GenericDialect};
use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};
use regex::Regex;
use sluice_schemas::{Flow, StageKind};
use tracing::debug;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TemplateError {
    #[error("Flow file not found: '{file_path}'")]
    #[diagnostic(
        code(sluice::template::file_not_found),
        help("Check that the file path is correct and the file exists")
    )]
    NotFound {
        #[source]
        source: std::io::Error,
        file_path: String,
    },

    #[error("Unsupported flow format: '{0}'")]
    #[diagnostic(
        code(sluice::template::unknown_format),
        help(
            "The flow format '{0}' is not supported in this build.\n\
             \n\
             Available formats in this build:\n\
             {}",
            Self::available_formats()
        )
    )]
    UnknownFormat(TemplateFormat),

    #[error("Missing template parameters: {0:?}")]
    #[diagnostic(
        code(sluice::template::missing_params),
        help(
            "Provide the missing parameters using the -p flag.\n\
              \n\
              Example:\n\
              sluice run -f flow.yml -p param1=value1 -p param2=value2"
        )
    )]
    MissingParams(HashSet<String>),

    #[cfg(feature = "json")]
    #[error("JSON parsing error")]
    #[diagnostic(code(sluice::template::json_parse_error))]
    ParseJson {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[label("{}", error)]
        span: SourceSpan,
        #[source]
        error: serde_json::Error,
    },

    #[cfg(feature = "yaml")]
    #[error("YAML parsing error")]
    #[diagnostic(code(sluice::template::yaml_parse_error))]
    ParseYaml {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[label("{}", error)]
        span: SourceSpan,
        #[source]
        error: serde_yml::Error,
    },

    #[error("SQL syntax error in custom stage")]
    #[diagnostic(
        code(sluice::template::sql_validation_error),
        help(
            "Check your SQL syntax in stage '{id}':\n\
              • Official docs: https://datafusion.apache.org/user-guide/sql/index.html"
        )
    )]
    SqlValidation {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[source]
        error: ParserError,
        #[label("syntax error in stage '{id}'")]
        span: SourceSpan,
        id: String,
    },
}

impl TemplateError {
    fn available_formats() -> String {
        let mut formats = vec![];

        #[cfg(feature = "json")]
        formats.push("• JSON (.json)");

        #[cfg(feature = "yaml")]
        formats.push("• YAML (.yaml, .yml)");

        if formats.is_empty() {
            "No formats are currently enabled".to_string()
        } else {
            formats.join("\n")
        }
    }
}

/// Serialization format of a flow file, usually inferred from its extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFormat {
    /// JSON format (.json files)
    Json,
    /// YAML format (.yml or .yaml files)
    Yaml,
    /// Unknown or unsupported format
    Unknown(String),
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateFormat::Json => write!(f, "json"),
            TemplateFormat::Yaml => write!(f, "yaml"),
            TemplateFormat::Unknown(format) => write!(f, "{format}"),
        }
    }
}

/// Loading of flows from files or strings with `${param}` substitution
///
/// Parameters are substituted before the flow is deserialized, so they may appear anywhere in
/// the document: table rows, filter values, custom SQL. Every `${name}` left after substitution
/// is reported as missing.
pub trait TemplateLoader {
    /// Load a flow from a file, see [`format_from_path`] to infer the format
    fn from_file<P: AsRef<Path>>(
        path: P,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Flow, TemplateError>;

    /// Load a flow from a string
    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Flow, TemplateError>;

    /// Replace every `${name}` with its value, failing on parameters without a value
    fn substitute_params(
        raw: &str,
        params: HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();
        let mut definition = raw.to_string();

        params.into_iter().for_each(|(name, value)| {
            let template = format!("${{{name}}}");
            definition = definition.replace(template.as_str(), value.as_str());
        });

        let regex = PARAM_REGEX.get_or_init(|| {
            Regex::new("\\$\\{([a-zA-Z0-9_]+)\\}").expect("parameter pattern is valid")
        });

        let missing_params = regex
            .captures_iter(definition.as_str())
            .filter_map(|capture| capture.get(1))
            .map(|param| param.as_str().to_string())
            .collect::<HashSet<String>>();

        if !missing_params.is_empty() {
            return Err(TemplateError::MissingParams(missing_params));
        }

        Ok(definition)
    }

    /// Parse the SQL of every `CUSTOM` stage with DataFusion's parser
    fn validate_sql(flow: &Flow) -> Result<(), TemplateError> {
        let dialect = GenericDialect {};

        for stage in flow.stages.iter() {
            let StageKind::Custom(custom) = &stage.kind else {
                continue;
            };
            let Some(sql) = custom.sql.as_deref() else {
                continue;
            };

            DFParser::parse_sql_with_dialect(sql, &dialect).map_err(|error| {
                let span = match Self::try_extract_error_position(&error.to_string()) {
                    Some((line, col)) => {
                        let offset = sql
                            .lines()
                            .take(line.saturating_sub(1) as usize)
                            .map(|line_content| line_content.len() + 1)
                            .sum::<usize>()
                            + col.saturating_sub(1) as usize;

                        SourceSpan::new(offset.into(), 1)
                    }
                    None => SourceSpan::new(0.into(), sql.len()),
                };

                TemplateError::SqlValidation {
                    source_code: Arc::new(
                        NamedSource::new(&stage.id, sql.to_string()).with_language("SQL"),
                    ),
                    error,
                    span,
                    id: stage.id.clone(),
                }
            })?;
        }

        Ok(())
    }

    // sqlparser only exposes the position inside the message
    fn try_extract_error_position(error_msg: &str) -> Option<(u64, u64)> {
        static ERROR_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = ERROR_REGEX.get_or_init(|| {
            Regex::new(r"(?:at\s+)?Line:\s*(\d+),\s*Column:\s*(\d+)")
                .expect("position pattern is valid")
        });

        let captures = regex.captures(error_msg)?;
        let line = captures.get(1)?.as_str().parse::<u64>().ok()?;
        let column = captures.get(2)?.as_str().parse::<u64>().ok()?;

        Some((line, column))
    }
}

impl TemplateLoader for Flow {
    fn from_file<T: AsRef<Path>>(
        path: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Flow, TemplateError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::NotFound {
            source: e,
            file_path: path.display().to_string(),
        })?;
        Self::from_str(contents, format, params)
    }

    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Flow, TemplateError> {
        let contents = value.as_ref();

        debug!("Parsing template with format: {format:?}");

        let flow = match format {
            TemplateFormat::Json => {
                #[cfg(feature = "json")]
                {
                    let definition = Self::substitute_params(contents, params)?;
                    serde_json::from_str::<Flow>(definition.as_str()).map_err(|error| {
                        let offset =
                            SourceOffset::from_location(&definition, error.line(), error.column());
                        TemplateError::ParseJson {
                            source_code: Arc::new(NamedSource::new("flow.json", definition.clone())),
                            span: SourceSpan::new(offset, 1),
                            error,
                        }
                    })?
                }
                #[cfg(not(feature = "json"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Json));
                }
            }
            TemplateFormat::Yaml => {
                #[cfg(feature = "yaml")]
                {
                    let definition = Self::substitute_params(contents, params)?;
                    serde_yml::from_str::<Flow>(definition.as_str()).map_err(|error| {
                        let offset = match error.location() {
                            Some(location) => SourceOffset::from_location(
                                &definition,
                                location.line(),
                                location.column(),
                            ),
                            None => SourceOffset::from(0),
                        };
                        TemplateError::ParseYaml {
                            source_code: Arc::new(NamedSource::new("flow.yml", definition.clone())),
                            span: SourceSpan::new(offset, 1),
                            error,
                        }
                    })?
                }
                #[cfg(not(feature = "yaml"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Yaml));
                }
            }
            fmt @ TemplateFormat::Unknown(_) => return Err(TemplateError::UnknownFormat(fmt)),
        };

        Self::validate_sql(&flow)?;

        Ok(flow)
    }
}

pub fn format_from_path<P: AsRef<Path>>(path: P) -> TemplateFormat {
    let path = path.as_ref();
    let ext = path.extension().and_then(|s| s.to_str());

    match ext {
        Some("json") => TemplateFormat::Json,
        Some("yml") | Some("yaml") => TemplateFormat::Yaml,
        ext => TemplateFormat::Unknown(ext.unwrap_or("unknown_ext").to_string()),
    }
}
