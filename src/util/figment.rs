use error_stack::{Context, Report};

/// Turns a [`figment::Error`] into a report of `C`, keeping every
/// underlying problem and where it came from (the config file or an
/// environment variable) as printable attachments.
pub trait FigmentResultExt<T> {
    fn into_report<C: Context>(self, context: C) -> error_stack::Result<T, C>;
}

impl<T> FigmentResultExt<T> for Result<T, figment::Error> {
    fn into_report<C: Context>(self, context: C) -> error_stack::Result<T, C> {
        self.map_err(|error| attach_figment_error(Report::new(context), error))
    }
}

fn attach_figment_error<C: Context>(mut report: Report<C>, error: figment::Error) -> Report<C> {
    for problem in error {
        let mut line = problem.kind.to_string();

        if let (Some(profile), Some(md)) = (&problem.profile, &problem.metadata) {
            if !problem.path.is_empty() {
                let key = md.interpolate(profile, &problem.path);
                line.push_str(&format!(" (key {key:?})"));
            }
        }

        if let Some(md) = &problem.metadata {
            match &md.source {
                Some(source) => line.push_str(&format!(" in {source} {}", md.name)),
                None => line.push_str(&format!(" in {}", md.name)),
            }
        }

        report = report.attach_printable(line);
    }
    report
}
