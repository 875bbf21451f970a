use error_stack::Report;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

#[derive(Debug, Error)]
#[error("Invalid given data occurred")]
pub struct InvalidData;

/// Turns [`ValidationErrors`] into a report with one printable
/// attachment per offending value, named by its dotted path
/// (`statistics.cohorts`, `db.url`, ...).
pub trait IntoValidatorReport<T> {
    fn into_validator_report(self) -> error_stack::Result<T, InvalidData>;
}

impl<T> IntoValidatorReport<T> for Result<T, ValidationErrors> {
    fn into_validator_report(self) -> error_stack::Result<T, InvalidData> {
        self.map_err(|errors| {
            let mut lines = Vec::new();
            collect_errors(&errors, &mut Vec::new(), &mut lines);
            lines.sort();

            lines
                .into_iter()
                .fold(Report::new(InvalidData), |report, line| {
                    report.attach_printable(line)
                })
        })
    }
}

fn collect_errors(errors: &ValidationErrors, path: &mut Vec<String>, lines: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let field = field.to_string();
        // struct level checks are reported under the struct itself
        let pushed = field != "__all__";
        if pushed {
            path.push(field);
        }

        match kind {
            ValidationErrorsKind::Struct(inner) => collect_errors(inner, path, lines),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    path.push(index.to_string());
                    collect_errors(inner, path, lines);
                    path.pop();
                }
            }
            ValidationErrorsKind::Field(failures) => {
                let key = path.join(".");
                for failure in failures {
                    let message = failure.message.as_deref().unwrap_or(&*failure.code);
                    lines.push(format!("invalid {key}: {message}"));
                }
            }
        }

        if pushed {
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Debug, Validate)]
    struct Inner {
        #[validate(range(min = 1, message = "must be positive"))]
        count: u32,
    }

    #[derive(Debug, Validate)]
    struct Outer {
        #[validate(nested)]
        inner: Inner,
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn should_name_nested_fields() {
        let outer = Outer {
            inner: Inner { count: 0 },
            name: String::new(),
        };

        let report = outer.validate().into_validator_report().unwrap_err();
        let message = format!("{report:?}");
        assert!(message.contains("invalid inner.count: must be positive"), "{message}");
        assert!(message.contains("invalid name: length"), "{message}");
    }

    #[test]
    fn valid_data_passes() {
        let outer = Outer {
            inner: Inner { count: 3 },
            name: "tidings".into(),
        };
        assert!(outer.validate().into_validator_report().is_ok());
    }
}
