//! Line transformations over `Consumer<String>`

use std::sync::Arc;

use engine::{Consumer, DataShape, DataType, Stage, StageContext};

use crate::error::StageError;

/// Payload shape of every text pipeline
pub type Text = Consumer<String>;

/// Callable value flowing through a text pipeline
pub type TextSink = Arc<dyn Fn(String) + Send + Sync>;

fn text_shape() -> Option<DataShape> {
    Some(Text::new().shape())
}

/// Forward `f(line)` to `output`
fn mapped<F>(output: TextSink, f: F) -> TextSink
where
    F: Fn(String) -> String + Send + Sync + 'static,
{
    Arc::new(move |line: String| output(f(line)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl Stage<Text> for Uppercase {
    fn bind(&self, output: TextSink, _ctx: &StageContext<'_, Text>) -> TextSink {
        mapped(output, |line| line.to_uppercase())
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Stage<Text> for Lowercase {
    fn bind(&self, output: TextSink, _ctx: &StageContext<'_, Text>) -> TextSink {
        mapped(output, |line| line.to_lowercase())
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

/// Strips leading and trailing whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

impl Stage<Text> for Trim {
    fn bind(&self, output: TextSink, _ctx: &StageContext<'_, Text>) -> TextSink {
        mapped(output, |line| line.trim().to_string())
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

/// Wraps every line in a fixed prefix and suffix
#[derive(Debug, Clone, Default)]
pub struct Affix {
    prefix: Arc<str>,
    suffix: Arc<str>,
}

impl Affix {
    pub fn prefix(text: &str) -> Self {
        Self {
            prefix: Arc::from(text),
            suffix: Arc::from(""),
        }
    }

    pub fn suffix(text: &str) -> Self {
        Self {
            prefix: Arc::from(""),
            suffix: Arc::from(text),
        }
    }
}

impl Stage<Text> for Affix {
    fn bind(&self, output: TextSink, _ctx: &StageContext<'_, Text>) -> TextSink {
        let prefix = Arc::clone(&self.prefix);
        let suffix = Arc::clone(&self.suffix);
        mapped(output, move |line| format!("{prefix}{line}{suffix}"))
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

/// Reports blank lines as processing errors and drops them
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectEmpty;

impl Stage<Text> for RejectEmpty {
    fn bind(&self, output: TextSink, ctx: &StageContext<'_, Text>) -> TextSink {
        let reporter = ctx.reporter();
        Arc::new(move |line: String| {
            if line.trim().is_empty() {
                reporter.fail(StageError::EmptyLine, &line);
                return;
            }
            output(line);
        })
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

/// Reports lines longer than `limit` characters and drops them
#[derive(Debug, Clone, Copy)]
pub struct MaxLength {
    limit: usize,
}

impl MaxLength {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Stage<Text> for MaxLength {
    fn bind(&self, output: TextSink, ctx: &StageContext<'_, Text>) -> TextSink {
        let reporter = ctx.reporter();
        let limit = self.limit;
        Arc::new(move |line: String| {
            let len = line.chars().count();
            if len > limit {
                reporter.fail(StageError::TooLong { len, limit }, &line);
                return;
            }
            output(line);
        })
    }

    fn accepts(&self) -> Option<DataShape> {
        text_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{ErrorPolicy, Pipeline};
    use parking_lot::Mutex;

    /// Pipeline with a single enabled stage; returns the feeder and the log
    fn run_through<S: Stage<Text>>(stage: S, lines: &[&str]) -> (Vec<String>, Pipeline<Text>) {
        let pipeline = Pipeline::new("t", Text::new()).unwrap();
        pipeline.set_error_policy(ErrorPolicy::Suppress);
        pipeline
            .add_processor("under-test", 1, stage)
            .unwrap()
            .enable(true)
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        pipeline
            .tail()
            .add_output("out")
            .unwrap()
            .create_end_point("log", Arc::new(move |s: String| log.lock().push(s)))
            .unwrap();
        let entry = pipeline
            .head()
            .add_input("in")
            .unwrap()
            .create_entry_point("main")
            .unwrap();

        for line in lines {
            (entry.input())(line.to_string());
        }
        let seen = seen.lock().clone();
        (seen, pipeline)
    }

    #[test]
    fn test_case_stages() {
        assert_eq!(run_through(Uppercase, &["Hello"]).0, ["HELLO"]);
        assert_eq!(run_through(Lowercase, &["Hello"]).0, ["hello"]);
        assert_eq!(run_through(Trim, &["  pad  "]).0, ["pad"]);
    }

    #[test]
    fn test_affix() {
        assert_eq!(run_through(Affix::prefix("> "), &["a"]).0, ["> a"]);
        assert_eq!(run_through(Affix::suffix(";"), &["a"]).0, ["a;"]);
    }

    #[test]
    fn test_reject_empty_reports_and_drops() {
        let (seen, pipeline) = run_through(RejectEmpty, &["one", "   ", "two"]);
        assert_eq!(seen, ["one", "two"]);
        assert_eq!(pipeline.stats().processing_errors, 1);
    }

    #[test]
    fn test_max_length_counts_chars() {
        let (seen, pipeline) = run_through(MaxLength::new(3), &["abc", "ünï", "abcd"]);
        assert_eq!(seen, ["abc", "ünï"]);
        assert_eq!(pipeline.stats().processing_errors, 1);
    }
}
