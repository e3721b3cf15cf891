//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Responsible for:
//! - Configuration file to running pipeline
//! - Topology consistency under concurrent relinks
//! - Error isolation and policy behaviour across stages
//! - Multi-argument payload shapes

#[cfg(test)]
mod contract_tests {
    use contracts::{ErrorKind, PipelineError, HEAD_PRIORITY, TAIL_PRIORITY};

    #[test]
    fn test_sentinel_priorities() {
        assert_eq!(HEAD_PRIORITY, i64::MIN);
        assert_eq!(TAIL_PRIORITY, i64::MAX);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::sentinel("head", "enable").kind(),
            ErrorKind::State
        );
        assert_eq!(
            PipelineError::config_validation("stages", "bad").kind(),
            ErrorKind::Configuration
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use engine::PipelineBuilder;
    use parking_lot::Mutex;
    use stages::{text_registry, Text, TextSink};

    const TEXT_TOML: &str = r#"
name = "text"

[errors]
policy = "suppress"

[[stages]]
name = "lower"
factory = "lowercase"
priority = 20

[[stages]]
name = "upper"
factory = "uppercase"
priority = 10

[[stages]]
name = "quote"
factory = "prefix"
priority = 30
enabled = false
params = { text = "> " }

[[stages]]
name = "guard"
factory = "reject-empty"
priority = 0

[[inputs]]
name = "stdin"
entry_points = ["main", "replay"]

[[outputs]]
name = "console"
end_points = ["left", "right"]
"#;

    fn collector() -> (TextSink, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        (Arc::new(move |line: String| log.lock().push(line)), seen)
    }

    /// Load -> registry -> builder -> feed -> reconfigure -> feed
    #[test]
    fn test_config_to_running_pipeline() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TEXT_TOML.as_bytes()).unwrap();
        let blueprint = ConfigLoader::load_from_path(file.path()).unwrap();

        let registry = text_registry().unwrap();
        let (left, left_seen) = collector();
        let (right, right_seen) = collector();
        let built = PipelineBuilder::new(&registry, Text::new())
            .end_point("left", left)
            .end_point("right", right)
            .build(&blueprint)
            .unwrap();
        let pipeline = built.pipeline();
        assert_eq!(pipeline.active_names(), ["guard", "upper", "lower"]);

        let main = built.entry_point("main").unwrap().input();
        main("Hello".to_string());
        main("   ".to_string());
        assert_eq!(*left_seen.lock(), ["hello"]);
        assert_eq!(*right_seen.lock(), ["hello"]);
        assert_eq!(pipeline.stats().processing_errors, 1);

        built.processor("lower").unwrap().bypass(true).unwrap();
        built.processor("quote").unwrap().enable(true).unwrap();
        let replay = built.entry_point("replay").unwrap().input();
        replay("Hello".to_string());
        assert_eq!(left_seen.lock().last().unwrap(), "> HELLO");
        assert_eq!(pipeline.active_names(), ["guard", "upper", "lower", "quote"]);
    }

    #[test]
    fn test_missing_end_point_consumer() {
        let blueprint = ConfigLoader::load_from_str(TEXT_TOML, ConfigFormat::Toml).unwrap();
        let registry = text_registry().unwrap();
        let (left, _) = collector();
        let err = PipelineBuilder::new(&registry, Text::new())
            .end_point("left", left)
            .build(&blueprint)
            .err()
            .unwrap();
        assert!(err.to_string().contains("'right'"), "got: {err}");
    }

    #[test]
    fn test_bad_stage_param_fails_build() {
        let content = TEXT_TOML.replace("params = { text = \"> \" }", "");
        let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        let registry = text_registry().unwrap();
        let (sink, _) = collector();
        let err = PipelineBuilder::new(&registry, Text::new())
            .default_end_point(sink)
            .build(&blueprint)
            .err()
            .unwrap();
        assert!(err.to_string().contains("text"), "got: {err}");
    }

    #[test]
    fn test_trace_tap_from_overrides() {
        let mut blueprint = ConfigLoader::load_from_str(TEXT_TOML, ConfigFormat::Toml).unwrap();
        let env = HashMap::from([
            (config_loader::ENV_TRACE_TAP, "yes"),
            (config_loader::ENV_TRACE_TAP_BYPASSED, "no"),
        ]);
        ConfigLoader::apply_overrides(&mut blueprint, |key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        blueprint.diagnostics.trace_tap_priority = 15;

        let registry = text_registry().unwrap();
        let (sink, seen) = collector();
        let built = PipelineBuilder::new(&registry, Text::new())
            .default_end_point(sink)
            .build(&blueprint)
            .unwrap();
        assert_eq!(
            built.pipeline().active_names(),
            ["guard", "upper", engine::TRACE_TAP_NAME, "lower"]
        );

        let tap = built.trace_tap().unwrap();
        let main = built.entry_point("main").unwrap().input();
        main("a".to_string());
        main("b".to_string());
        assert_eq!(tap.invocations(), 2);
        // two end points share the default consumer
        assert_eq!(*seen.lock(), ["a", "a", "b", "b"]);
    }

    /// The loader rejects exactly the name the builder installs the tap under
    #[test]
    fn test_stage_named_like_installed_tap_rejected() {
        let renamed = TEXT_TOML.replace(
            "name = \"guard\"",
            &format!("name = \"{}\"", engine::TRACE_TAP_NAME),
        );
        let content = format!("{renamed}\n[diagnostics]\ntrace_tap = true\n");
        let err = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains(engine::TRACE_TAP_NAME), "got: {err}");

        let relaxed = content.replace("trace_tap = true", "trace_tap = false");
        let blueprint = ConfigLoader::load_from_str(&relaxed, ConfigFormat::Toml).unwrap();
        assert!(blueprint.stages.iter().any(|s| s.name == engine::TRACE_TAP_NAME));
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::ErrorPolicy;
    use engine::{stage_fn, Pipeline, StageContext};
    use parking_lot::Mutex;
    use stages::{RejectEmpty, Text, TextSink};

    fn tag(label: &'static str, delay: Duration) -> impl engine::Stage<Text> {
        stage_fn::<Text, _>(move |out: TextSink, _ctx: &StageContext<'_, Text>| {
            Arc::new(move |line: String| {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                out(format!("{line}{label}"));
            }) as TextSink
        })
    }

    /// Every dispatch sees either the whole old chain or the whole new one
    #[test]
    fn test_dispatch_never_sees_half_relinked_chain() {
        let pipeline = Pipeline::new("concurrent", Text::new()).unwrap();
        pipeline
            .add_processor("a", 1, tag("a", Duration::from_micros(200)))
            .unwrap()
            .enable(true)
            .unwrap();
        let b = pipeline.add_processor("b", 2, tag("b", Duration::ZERO)).unwrap();
        b.enable(true).unwrap();
        pipeline
            .add_processor("c", 3, tag("c", Duration::from_micros(200)))
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
        let feed = pipeline
            .head()
            .add_input("in")
            .unwrap()
            .create_entry_point("main")
            .unwrap()
            .input();

        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            for _ in 0..4 {
                let feed = feed.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        feed("x".to_string());
                    }
                });
            }
            scope.spawn(|| {
                let mut on = true;
                while !done.load(Ordering::Relaxed) {
                    on = !on;
                    b.enable(on).unwrap();
                    thread::yield_now();
                }
                b.enable(true).unwrap();
            });
            scope.spawn(|| {
                while seen.lock().len() < 200 {
                    thread::sleep(Duration::from_millis(1));
                }
                done.store(true, Ordering::Relaxed);
            });
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 200);
        for trace in seen.iter() {
            assert!(trace == "xabc" || trace == "xac", "torn trace: {trace}");
        }
        assert_eq!(pipeline.stats().dispatches, 200);
        assert!(pipeline.stats().relinks >= 1);
    }

    /// Structural changes from another thread wait for in-flight dispatches
    #[test]
    fn test_bypass_toggle_under_load() {
        let pipeline = Pipeline::new("toggle", Text::new()).unwrap();
        let slow = pipeline
            .add_processor("slow", 1, tag("!", Duration::from_micros(100)))
            .unwrap();
        slow.enable(true).unwrap();

        let count = Arc::new(Mutex::new((0usize, 0usize)));
        let tally = Arc::clone(&count);
        pipeline
            .tail()
            .add_output("out")
            .unwrap()
            .create_end_point(
                "count",
                Arc::new(move |s: String| {
                    let mut t = tally.lock();
                    if s.ends_with('!') {
                        t.0 += 1;
                    } else {
                        t.1 += 1;
                    }
                }),
            )
            .unwrap();
        let feed = pipeline
            .head()
            .add_input("in")
            .unwrap()
            .create_entry_point("main")
            .unwrap()
            .input();

        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..100 {
                    feed("x".to_string());
                }
            });
            scope.spawn(|| {
                for i in 0..20 {
                    slow.bypass(i % 2 == 0).unwrap();
                    thread::yield_now();
                }
                slow.bypass(false).unwrap();
            });
        });

        let (tagged, plain) = *count.lock();
        assert_eq!(tagged + plain, 100);
        assert!(!slow.is_bypassed());
    }

    /// Suppressed failures on one entry point never cost another its values
    #[test]
    fn test_suppressed_failures_beside_valid_traffic() {
        const FAILING: usize = 150;
        const VALID: usize = 150;

        let pipeline = Pipeline::new("mixed", Text::new()).unwrap();
        pipeline.set_error_policy(ErrorPolicy::Suppress);
        pipeline
            .add_processor("guard", 1, RejectEmpty)
            .unwrap()
            .enable(true)
            .unwrap();
        let mark = pipeline
            .add_processor("mark", 2, tag("+", Duration::from_micros(50)))
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        pipeline
            .tail()
            .add_output("out")
            .unwrap()
            .create_end_point("log", Arc::new(move |s: String| log.lock().push(s)))
            .unwrap();
        let input = pipeline.head().add_input("in").unwrap();
        let failing = input.create_entry_point("a").unwrap().input();
        let valid = input.create_entry_point("b").unwrap().input();

        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..FAILING {
                    failing(String::new());
                }
            });
            scope.spawn(|| {
                for i in 0..VALID {
                    valid(format!("b{i}"));
                }
                done.store(true, Ordering::Relaxed);
            });
            scope.spawn(|| {
                let mut on = false;
                while !done.load(Ordering::Relaxed) {
                    on = !on;
                    mark.enable(on).unwrap();
                    thread::yield_now();
                }
            });
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), VALID, "lost outputs: {seen:?}");
        for (i, line) in seen.iter().enumerate() {
            let plain = format!("b{i}");
            assert!(
                *line == plain || *line == format!("{plain}+"),
                "torn or reordered output at {i}: {line}"
            );
        }

        let stats = pipeline.stats();
        assert_eq!(stats.processing_errors, FAILING as u64);
        assert_eq!(stats.dispatches, (FAILING + VALID) as u64);
        assert!(!pipeline.is_terminated());
    }
}

#[cfg(test)]
mod error_policy_tests {
    use std::sync::Arc;

    use contracts::{ErrorPolicy, ProcessingError};
    use engine::{Pipeline, PipelineListener, RetryHandler};
    use parking_lot::Mutex;
    use stages::{MaxLength, RejectEmpty, Text, TextSink, Uppercase};

    #[derive(Default)]
    struct Recorder {
        errors: Mutex<Vec<(String, String)>>,
    }

    impl PipelineListener for Recorder {
        fn on_error(&self, _pipeline: &str, error: &ProcessingError) {
            self.errors.lock().push((
                error.source_processor().to_string(),
                error.failed_data().unwrap_or_default().to_string(),
            ));
        }
    }

    struct AlwaysFails;

    impl RetryHandler for AlwaysFails {
        fn retry(&self, error: &ProcessingError) -> Result<(), contracts::ErrorCause> {
            Err(contracts::MessageCause::shared(format!(
                "retry of {} failed",
                error.source_processor()
            )))
        }
    }

    fn guarded(policy: ErrorPolicy) -> (Pipeline<Text>, TextSink, Arc<Mutex<Vec<String>>>) {
        let pipeline = Pipeline::new("guarded", Text::new()).unwrap();
        pipeline.set_error_policy(policy);
        for (name, priority) in [("empty", 1), ("upper", 2), ("length", 3)] {
            let handle = match name {
                "empty" => pipeline.add_processor(name, priority, RejectEmpty),
                "upper" => pipeline.add_processor(name, priority, Uppercase),
                _ => pipeline.add_processor(name, priority, MaxLength::new(5)),
            }
            .unwrap();
            handle.enable(true).unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        pipeline
            .tail()
            .add_output("out")
            .unwrap()
            .create_end_point("log", Arc::new(move |s: String| log.lock().push(s)))
            .unwrap();
        let feed = pipeline
            .head()
            .add_input("in")
            .unwrap()
            .create_entry_point("main")
            .unwrap()
            .input();
        (pipeline, feed, seen)
    }

    #[test]
    fn test_failures_isolated_per_invocation() {
        let (pipeline, feed, seen) = guarded(ErrorPolicy::Suppress);
        for line in ["ok", "", "toolong", "fine"] {
            feed(line.to_string());
        }
        assert_eq!(*seen.lock(), ["OK", "FINE"]);
        assert_eq!(pipeline.stats().processing_errors, 2);
        assert!(!pipeline.is_terminated());
    }

    #[test]
    fn test_propagate_names_failing_stage() {
        let (pipeline, feed, _) = guarded(ErrorPolicy::Propagate);
        let recorder = Arc::new(Recorder::default());
        pipeline.add_listener(recorder.clone());

        feed("".to_string());
        feed("toolong".to_string());
        let errors = recorder.errors.lock();
        assert_eq!(errors[0].0, "empty");
        assert_eq!(errors[1].0, "length");
        assert_eq!(errors[1].1, "\"TOOLONG\"");
    }

    #[test]
    fn test_failed_retry_propagates() {
        let (pipeline, feed, _) = guarded(ErrorPolicy::Retry);
        let recorder = Arc::new(Recorder::default());
        pipeline.add_listener(recorder.clone());
        pipeline.set_retry_handler(Arc::new(AlwaysFails));

        feed("".to_string());
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn test_terminate_stops_the_pipeline() {
        let (pipeline, feed, seen) = guarded(ErrorPolicy::Terminate);
        feed("".to_string());
        feed("after".to_string());
        assert!(pipeline.is_terminated());
        assert!(seen.lock().is_empty());
        assert_eq!(pipeline.stats().dropped, 1);
    }
}

#[cfg(test)]
mod payload_shape_tests {
    use std::sync::Arc;

    use engine::{stage_fn, BiConsumer, DataType, Pipeline, StageContext};
    use parking_lot::Mutex;

    type Numbered = BiConsumer<String, usize>;
    type NumberedSink = Arc<dyn Fn(String, usize) + Send + Sync>;

    #[test]
    fn test_two_argument_payload() {
        let pipeline = Pipeline::new("numbered", Numbered::new()).unwrap();
        pipeline
            .add_processor(
                "double",
                1,
                stage_fn::<Numbered, _>(|out: NumberedSink, _ctx: &StageContext<'_, Numbered>| {
                    Arc::new(move |line: String, n: usize| out(line, n * 2)) as NumberedSink
                }),
            )
            .unwrap()
            .enable(true)
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        pipeline
            .tail()
            .add_output("out")
            .unwrap()
            .create_end_point(
                "log",
                Arc::new(move |line: String, n: usize| log.lock().push(format!("{line}:{n}"))),
            )
            .unwrap();
        let feed = pipeline
            .head()
            .add_input("in")
            .unwrap()
            .create_entry_point("main")
            .unwrap()
            .input();

        feed("a".to_string(), 1);
        feed("b".to_string(), 21);
        assert_eq!(*seen.lock(), ["a:2", "b:42"]);
        assert!(pipeline.data_type().shape().name().starts_with("BiConsumer"));
    }
}
