// lox-embed integration tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tests for the lox-embed embedding API.

use lox_embed::{CapturedOutput, Engine, Error, InterpretError, Pinned, Value, VmConfig};

// =============================================================================
// Globals and conversions
// =============================================================================

mod globals {
    use super::*;

    #[test]
    fn host_values_are_visible_to_scripts() {
        let mut engine = Engine::new();
        let output = engine.capture_output();
        engine.set_global("n", 20i64);
        engine.set_global("flag", true);
        engine.set_global("name", "world");
        engine.set_global("nothing", ());
        engine
            .eval("print n + 1; print !flag; print \"hello \" + name; print nothing;")
            .unwrap();
        assert_eq!(output.contents(), "21\nfalse\nhello world\nnil\n");
    }

    #[test]
    fn script_values_are_visible_to_the_host() {
        let mut engine = Engine::new();
        engine
            .eval("var f = 2.5; var i = 7; var s = \"a\" + \"b\"; var b = 1 < 2; var n = nil;")
            .unwrap();
        assert_eq!(engine.get_global::<f64>("f").unwrap(), 2.5);
        assert_eq!(engine.get_global::<i64>("i").unwrap(), 7);
        assert_eq!(engine.get_global::<String>("s").unwrap(), "ab");
        assert!(engine.get_global::<bool>("b").unwrap());
        assert_eq!(engine.get_global::<Option<f64>>("n").unwrap(), None);
        engine.get_global::<()>("n").unwrap();
    }

    #[test]
    fn conversion_failures() {
        let mut engine = Engine::new();
        engine.eval("var s = \"text\"; var half = 0.5;").unwrap();
        assert!(matches!(
            engine.get_global::<f64>("s"),
            Err(Error::TypeError { expected: "number", got: "string" })
        ));
        assert!(matches!(engine.get_global::<i64>("half"), Err(Error::Conversion(_))));
        assert!(matches!(
            engine.get_global::<f64>("absent"),
            Err(Error::UndefinedGlobal(name)) if name == "absent"
        ));
    }

    #[test]
    fn string_unicode_round_trip() {
        let mut engine = Engine::new();
        engine.set_global("empty", "");
        engine.set_global("unicode", "Hello, 世界!".to_string());
        assert_eq!(engine.get_global::<String>("empty").unwrap(), "");
        assert_eq!(engine.get_global::<String>("unicode").unwrap(), "Hello, 世界!");
    }

    #[test]
    fn host_strings_survive_collection() {
        let mut engine = Engine::with_config(VmConfig::stress());
        engine.set_global("kept", "still here");
        engine.collect_garbage();
        engine.eval("var copy = kept + \"!\";").unwrap();
        assert_eq!(engine.get_global::<String>("copy").unwrap(), "still here!");
    }

    #[test]
    fn held_values_survive_reassignment_and_collection() {
        let mut engine = Engine::new();
        engine.eval(r#"var s = "hello" + " world";"#).unwrap();
        let s = engine.get_global::<Pinned>("s").unwrap();

        engine.eval("s = nil;").unwrap();
        engine.collect_garbage();
        assert_eq!(engine.display(&s), "hello world");

        // New objects must not land in the held string's slot.
        engine.eval(r#"var t = "other" + "thing";"#).unwrap();
        assert_eq!(engine.display(&s), "hello world");
        assert_eq!(engine.display(&engine.get_global::<Pinned>("t").unwrap()), "otherthing");
    }

    #[test]
    fn dropping_a_held_value_releases_it() {
        let mut engine = Engine::new();
        engine.eval(r#"var s = "short" + " lived";"#).unwrap();
        let s = engine.get_global::<Pinned>("s").unwrap();
        engine.eval("s = nil;").unwrap();

        engine.collect_garbage();
        let freed = engine.vm().heap().stats().objects_freed;
        drop(s);
        engine.collect_garbage();
        assert_eq!(engine.vm().heap().stats().objects_freed, freed + 1);
    }

    #[test]
    fn held_values_can_be_passed_back() {
        let mut engine = Engine::with_config(VmConfig::stress());
        let output = engine.capture_output();
        engine.eval("class Counter { init() { this.n = 0; } }").unwrap();
        engine.eval("var c = Counter(); c.n = 3;").unwrap();
        let counter = engine.get_global::<Pinned>("c").unwrap();

        engine.eval("c = nil;").unwrap();
        engine.collect_garbage();
        engine.set_global("again", &counter);
        engine.eval("print again.n;").unwrap();
        assert_eq!(output.contents(), "3
");
    }
}

// =============================================================================
// Native functions
// =============================================================================

mod natives {
    use super::*;

    #[test]
    fn registered_native_is_callable() {
        let mut engine = Engine::new();
        engine.register_native("square", |args: &[Value]| match args {
            [Value::Number(n)] => Ok(Value::Number(n * n)),
            _ => Err("square expects one number".to_string()),
        });
        engine.eval("var r = square(12);").unwrap();
        assert_eq!(engine.get_global::<f64>("r").unwrap(), 144.0);
    }

    #[test]
    fn native_error_is_a_runtime_error() {
        let mut engine = Engine::new();
        engine.register_native("square", |args: &[Value]| match args {
            [Value::Number(n)] => Ok(Value::Number(n * n)),
            _ => Err("square expects one number".to_string()),
        });
        let err = engine.eval("square();").unwrap_err();
        assert_eq!(err.exit_code(), 70);
        assert_eq!(err.report(), "square expects one number\n[line 1] in script");
    }

    #[test]
    fn natives_can_close_over_host_state() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut engine = Engine::new();
        engine.register_native("tick", move |_args: &[Value]| {
            counter.set(counter.get() + 1);
            Ok(Value::Nil)
        });
        engine
            .eval("for (var i = 0; i < 5; i = i + 1) tick();")
            .unwrap();
        assert_eq!(calls.get(), 5);
    }
}

// =============================================================================
// Evaluation and errors
// =============================================================================

mod evaluation {
    use super::*;

    #[test]
    fn compile_error_reports_diagnostics() {
        let mut engine = Engine::new();
        let err = engine.eval("var = 1;").unwrap_err();
        assert!(matches!(err, InterpretError::Compile(_)));
        assert_eq!(err.exit_code(), 65);
        assert_eq!(err.report(), "[line 1] Error at '=': Expect variable name.");
    }

    #[test]
    fn engine_is_reusable_after_errors() {
        let mut engine = Engine::new();
        let output = engine.capture_output();
        engine.eval("var x = 1;").unwrap();
        assert!(engine.eval("x = x + nil;").is_err());
        assert!(engine.eval("print (;").is_err());
        engine.eval("print x;").unwrap();
        assert_eq!(output.take(), "1\n");
        assert_eq!(output.contents(), "");
    }

    #[test]
    fn engines_are_independent() {
        let mut a = Engine::new();
        let b = Engine::new();
        a.eval("var only_in_a = 1;").unwrap();
        assert!(a.get_global::<f64>("only_in_a").is_ok());
        assert!(matches!(
            b.get_global::<f64>("only_in_a"),
            Err(Error::UndefinedGlobal(_))
        ));
    }

    #[test]
    fn eval_file_reads_source() {
        let dir = std::env::temp_dir().join(format!("lox-embed-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("script.lox");
        std::fs::write(&path, "var from_file = \"loaded\";").unwrap();

        let mut engine = Engine::new();
        engine.eval_file(&path).unwrap();
        assert_eq!(engine.get_global::<String>("from_file").unwrap(), "loaded");

        let missing = engine.eval_file(dir.join("missing.lox")).unwrap_err();
        assert!(matches!(missing, Error::Io { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn with_output_redirects_print() {
        let out = CapturedOutput::default();
        let mut engine = Engine::new().with_output(out.clone());
        engine.eval("print \"to the host\";").unwrap();
        assert_eq!(out.contents(), "to the host\n");
    }

    #[test]
    fn display_matches_print() {
        let mut engine = Engine::new();
        engine.eval("class Widget {} var w = Widget();").unwrap();
        let w = engine.get_global::<Pinned>("w").unwrap();
        assert_eq!(engine.display(&w), "Widget instance");
    }
}
