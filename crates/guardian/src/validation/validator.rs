//! Validation entry points.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use super::check::{check, Issue};
use super::sanitize::{preprocess, sanitize};
use super::schema::Schema;
use crate::error::{ErrorContext, GuardResult, GuardianError};
use crate::logger::Logger;

/// Per-call validation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Skip preprocessing and sanitization; reject instead of coercing.
    pub strict: bool,
    /// Return `Err` on failure instead of a failed [`ValidationResult`].
    pub throw_on_error: bool,
    /// Log accumulated warnings and failures through the injected logger.
    pub log_warnings: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            strict: false,
            throw_on_error: false,
            log_warnings: true,
        }
    }
}

impl ValidateOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn throwing(mut self) -> Self {
        self.throw_on_error = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.log_warnings = false;
        self
    }
}

/// Outcome of a single validation.
#[derive(Debug)]
pub struct ValidationResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<GuardianError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Deserialize the validated data into a typed record.
    pub fn data_as<T: DeserializeOwned>(&self) -> GuardResult<T> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| GuardianError::configuration("validation failed, no data to deserialize"))?;
        serde_json::from_value(data).map_err(|err| GuardianError::configuration(format!("validated data does not deserialize: {}", err)))
    }
}

/// An item rejected by [`SchemaValidator::validate_batch`].
#[derive(Debug)]
pub struct BatchFailure {
    pub item: Value,
    pub error: GuardianError,
}

/// Partitioned outcome of a batch validation.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub successful: Vec<Value>,
    pub failed: Vec<BatchFailure>,
    pub warnings: Vec<String>,
}

/// Preprocess, sanitize and structurally check untyped input.
#[derive(Clone)]
pub struct SchemaValidator {
    logger: Arc<dyn Logger>,
}

impl SchemaValidator {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    /// Validate `data` against `schema`.
    ///
    /// Only returns `Err` when `options.throw_on_error` is set; otherwise a
    /// failure is reported through [`ValidationResult::error`].
    pub fn validate(&self, data: &Value, schema: &Schema, options: ValidateOptions) -> GuardResult<ValidationResult> {
        let mut warnings = Vec::new();

        let candidate = if options.strict {
            data.clone()
        } else {
            let preprocessed = preprocess(data, "", &mut warnings);
            sanitize(&preprocessed, schema, "", &mut warnings)
        };

        let mut issues = Vec::new();
        let checked = check(&candidate, schema, "", &mut issues);

        if options.log_warnings && !warnings.is_empty() {
            self.logger.warn(
                "validation applied coercions",
                &json!({ "schema": schema.kind_name(), "warnings": warnings }),
            );
        }

        if issues.is_empty() {
            return Ok(ValidationResult {
                success: true,
                data: Some(checked),
                error: None,
                warnings,
            });
        }

        let error = validation_error(data, schema, candidate, &issues);
        if options.log_warnings {
            self.logger.error("validation failed", &error.report_value());
        }

        if options.throw_on_error {
            return Err(error);
        }

        Ok(ValidationResult {
            success: false,
            data: None,
            error: Some(error),
            warnings,
        })
    }

    /// Validate each item independently; one failure never aborts the batch.
    pub fn validate_batch(&self, items: &[Value], schema: &Schema, options: ValidateOptions) -> BatchResult {
        let per_item = ValidateOptions {
            throw_on_error: false,
            ..options
        };
        let mut batch = BatchResult::default();

        for item in items {
            match self.validate(item, schema, per_item) {
                Ok(result) => {
                    batch.warnings.extend(result.warnings);
                    match (result.data, result.error) {
                        (Some(data), None) => batch.successful.push(data),
                        (_, Some(error)) => batch.failed.push(BatchFailure {
                            item: item.clone(),
                            error,
                        }),
                        (None, None) => {}
                    }
                }
                Err(error) => batch.failed.push(BatchFailure {
                    item: item.clone(),
                    error,
                }),
            }
        }

        batch
    }
}

fn validation_error(input: &Value, schema: &Schema, actual: Value, issues: &[Issue]) -> GuardianError {
    let summary = issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path, issue.message))
        .collect::<Vec<_>>()
        .join("; ");
    GuardianError::validation(
        summary,
        ErrorContext::new()
            .with_input(input.clone())
            .with_expected(schema.describe())
            .with_actual(actual)
            .with_metadata(json!({ "issues": issues })),
    )
}
