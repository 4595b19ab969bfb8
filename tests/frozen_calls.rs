use genvm::{Runtime, Value};

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn yield_inside_call_arguments_keeps_the_call_pending() {
    let mut rt = Runtime::from_source(
        r#"
        fn main()
            $r = intdiv(intdiv(60, yield "a"), yield "b")
            yield $r
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("main", vec![]).unwrap();

    assert_eq!(rt.current(&g).unwrap(), Some(Value::str("a")));
    assert!(g.has_frozen_calls());
    // nothing of the suspended generator is left on the shared stack
    assert!(rt.ctx.stack.is_empty());

    assert_eq!(rt.send(&g, Value::Int(2)).unwrap(), Some(Value::str("b")));
    assert!(g.has_frozen_calls());
    assert!(rt.ctx.stack.is_empty());

    assert_eq!(rt.send(&g, Value::Int(3)).unwrap(), Some(Value::Int(10)));
    assert!(!g.has_frozen_calls());
    assert!(rt.ctx.stack.is_empty());
}

#[test]
fn named_arguments_survive_suspension() {
    let mut rt = Runtime::from_source(
        r#"
        fn pair($left, $right)
            yield $left . "-" . $right
        end

        fn main()
            $p = pair(right: yield "r?", left: "L")
            $v = $p->current()
            yield $v
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("main", vec![]).unwrap();
    assert_eq!(rt.current(&g).unwrap(), Some(Value::str("r?")));
    assert_eq!(rt.send(&g, Value::str("R")).unwrap(), Some(Value::str("L-R")));
}

#[test]
fn destroying_a_generator_releases_its_frozen_calls() {
    let mut rt = Runtime::from_source(
        r#"
        fn main()
            $r = intdiv(100, yield 1)
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("main", vec![]).unwrap();
    rt.current(&g).unwrap();
    assert!(g.has_frozen_calls());
    rt.destroy(&g).unwrap();
    assert!(!g.has_frozen_calls());
    assert!(rt.ctx.stack.is_empty());
}
