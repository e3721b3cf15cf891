//! Upper/Lower Example
//!
//! Builds a pipeline by hand, then reconfigures it between dispatches:
//! enable, bypass, disable and re-prioritise processors while the same
//! entry point value keeps feeding the chain.
//!
//! Run with: cargo run -p demos --bin upper_lower

use std::sync::Arc;

use engine::{Pipeline, PipelineListener, Result};
use stages::{Affix, Lowercase, Text, TextSink, Uppercase};

struct RelinkLogger;

impl PipelineListener for RelinkLogger {
    fn on_relink(&self, pipeline: &str, active: &[String]) {
        tracing::info!(pipeline, ?active, "Relinked");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let pipeline = Pipeline::new("upper-lower", Text::new())?;
    pipeline.add_listener(Arc::new(RelinkLogger));

    let upper = pipeline.add_processor("upper", 10, Uppercase)?;
    let lower = pipeline.add_processor("lower", 20, Lowercase)?;
    let quote = pipeline.add_processor("quote", 30, Affix::prefix("> "))?;

    let print: TextSink = Arc::new(|line: String| println!("{line}"));
    pipeline
        .tail()
        .add_output("stdout")?
        .create_end_point("console", print)?;
    let feed = pipeline
        .head()
        .add_input("demo")?
        .create_entry_point("main")?
        .input();

    // nothing enabled yet: head forwards straight to tail
    feed("Hello World".to_string());

    upper.enable(true)?;
    feed("Hello World".to_string());

    lower.enable(true)?;
    quote.enable(true)?;
    feed("Hello World".to_string());

    // lower runs before upper once it moves ahead
    lower.set_priority(5)?;
    feed("Hello World".to_string());

    upper.bypass(true)?;
    feed("Hello World".to_string());

    quote.enable(false)?;
    feed("Hello World".to_string());

    let stats = pipeline.stats();
    tracing::info!(
        dispatches = stats.dispatches,
        relinks = stats.relinks,
        cascades = stats.cascades,
        "Done"
    );
    Ok(())
}
