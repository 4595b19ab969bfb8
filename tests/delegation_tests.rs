use genvm::{Exception, GeneratorRef, GeneratorState, Interpreter, Runtime, Value, delegation};
use std::cell::RefCell;
use std::rc::Rc;

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

const CHAIN: &str = r#"
fn c()
    $t = backtrace()
    yield $t
    yield "v"
    return "c-done"
end

fn b()
    $r = yield from c()
    yield "b:" . $r
end

fn a()
    $r = yield from b()
    yield "a-own"
end
"#;

fn names(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(list)) => list.values().map(|v| v.to_string()).collect(),
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn undelegated_generator_is_its_own_effective_generator() {
    let mut rt = Runtime::from_source("fn g()\n    yield 1\n    yield 2\nend").unwrap();
    let g = rt.spawn("g", vec![]).unwrap();
    for _ in 0..3 {
        assert!(Rc::ptr_eq(&rt.resolve_effective(&g).unwrap(), &g));
        rt.next(&g).unwrap();
    }
    assert!(Rc::ptr_eq(&rt.resolve_effective(&g).unwrap(), &g));
}

#[test]
fn three_level_chain_reports_the_leaf_value() {
    let mut rt = Runtime::from_source(CHAIN).unwrap();
    let a = rt.spawn("a", vec![]).unwrap();

    // the backtrace was taken in c while a was being resumed
    assert_eq!(names(rt.current(&a).unwrap()), vec!["c", "b", "a"]);
    assert_eq!(a.state(), GeneratorState::Delegating);

    let chain = delegation::chain(&a);
    assert_eq!(chain.len(), 3);
    let (b, c) = (chain[1].clone(), chain[2].clone());
    assert!(Rc::ptr_eq(&delegation::tree_root(&a), &c));
    assert_eq!(c.children_count(), 1);

    rt.next(&a).unwrap();
    assert_eq!(rt.current(&a).unwrap(), Some(Value::str("v")));
    assert_eq!(rt.current(&b).unwrap(), Some(Value::str("v")));
    assert!(Rc::ptr_eq(&rt.resolve_effective(&a).unwrap(), &c));
    assert!(Rc::ptr_eq(&rt.resolve_effective(&b).unwrap(), &c));

    // c returns, b takes over with the return value
    rt.next(&a).unwrap();
    assert_eq!(rt.current(&a).unwrap(), Some(Value::str("b:c-done")));
    assert!(c.is_finished());
    assert!(Rc::ptr_eq(&rt.resolve_effective(&a).unwrap(), &b));

    rt.next(&a).unwrap();
    assert_eq!(rt.current(&a).unwrap(), Some(Value::str("a-own")));
    assert!(a.parent().is_none());
    assert_eq!(a.state(), GeneratorState::Suspended);
    rt.next(&a).unwrap();
    assert!(!rt.valid(&a).unwrap());
}

#[test]
fn exhausted_delegate_leaves_no_stale_value() {
    let mut rt = Runtime::from_source(
        r#"
        fn h()
            yield 5 => "h1"
        end

        fn g()
            yield from h()
        end

        fn g2()
            yield from h()
            yield "own"
        end
        "#,
    )
    .unwrap();

    let g = rt.spawn("g", vec![]).unwrap();
    assert_eq!(rt.current(&g).unwrap(), Some(Value::str("h1")));
    assert_eq!(rt.key(&g).unwrap(), Some(Value::Int(5)));
    rt.next(&g).unwrap();
    assert!(!rt.valid(&g).unwrap());
    assert_eq!(rt.current(&g).unwrap(), None);
    assert_eq!(rt.key(&g).unwrap(), None);

    let g2 = rt.spawn("g2", vec![]).unwrap();
    assert_eq!(rt.current(&g2).unwrap(), Some(Value::str("h1")));
    rt.next(&g2).unwrap();
    assert_eq!(rt.current(&g2).unwrap(), Some(Value::str("own")));
    // the generator's own key counter is untouched by the delegate's keys
    assert_eq!(rt.key(&g2).unwrap(), Some(Value::Int(0)));
    assert!(g2.parent().is_none());
}

#[test]
fn array_delegation_then_own_frame() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            $r = yield from ["a", "b"]
            echo "resumed"
            yield "own"
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("g", vec![]).unwrap();

    rt.resume(&g).unwrap();
    assert_eq!((g.value(), g.key()), (Some(Value::str("a")), Some(Value::Int(0))));
    assert!(g.has_delegation_source());
    rt.resume(&g).unwrap();
    assert_eq!((g.value(), g.key()), (Some(Value::str("b")), Some(Value::Int(1))));
    assert!(rt.take_output().is_empty());

    rt.resume(&g).unwrap();
    assert_eq!(rt.take_output(), vec!["resumed".to_string()]);
    assert_eq!(g.value(), Some(Value::str("own")));
    assert!(!g.has_delegation_source());
}

#[test]
fn range_and_empty_array_delegation() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            yield from []
            yield from range(3, 4)
            yield "end"
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("g", vec![]).unwrap();
    let pairs: Vec<_> = rt.iter(&g, false).unwrap().map(|p| p.unwrap()).collect();
    assert_eq!(
        pairs,
        vec![
            (Value::Int(0), Value::Int(3)),
            (Value::Int(1), Value::Int(4)),
            (Value::Int(0), Value::str("end")),
        ]
    );
}

#[test]
fn two_consumers_share_one_delegate() {
    let mut rt = Runtime::from_source(
        r#"
        fn shared()
            yield 1
            yield 2
            return "s"
        end

        fn consumer($src, $tag)
            $r = yield from $src
            yield $tag . $r
        end
        "#,
    )
    .unwrap();
    let x = rt.spawn("shared", vec![]).unwrap();
    let a = rt.spawn("consumer", vec![Value::Generator(x.clone()), Value::str("a")]).unwrap();
    let b = rt.spawn("consumer", vec![Value::Generator(x.clone()), Value::str("b")]).unwrap();

    assert_eq!(rt.current(&a).unwrap(), Some(Value::Int(1)));
    // linking to a delegate that already produced a value does not advance it
    assert_eq!(rt.current(&b).unwrap(), Some(Value::Int(1)));
    assert_eq!(x.children_count(), 2);

    rt.next(&a).unwrap();
    assert_eq!(rt.current(&b).unwrap(), Some(Value::Int(2)));

    rt.next(&b).unwrap();
    assert!(x.is_finished());
    assert_eq!(rt.current(&b).unwrap(), Some(Value::str("bs")));
    assert_eq!(x.children_count(), 1);

    rt.next(&a).unwrap();
    assert_eq!(rt.current(&a).unwrap(), Some(Value::str("as")));
    assert_eq!(x.children_count(), 0);
}

#[test]
fn exception_from_delegate_is_rethrown_into_consumer() {
    let mut rt = Runtime::from_source(
        r#"
        fn inner()
            yield 1
            throw new Exception("inner failed")
        end

        fn outer()
            try {
                yield from inner()
            } catch Exception $e {
                yield $e
            }
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("outer", vec![]).unwrap();
    assert_eq!(rt.current(&g).unwrap(), Some(Value::Int(1)));
    rt.next(&g).unwrap();
    match rt.current(&g).unwrap() {
        Some(Value::Exception(e)) => assert_eq!(e.message(), "inner failed"),
        other => panic!("expected the caught exception, got {other:?}"),
    }
    assert!(g.parent().is_none());
}

#[test]
fn thrown_exception_reaches_the_leaf_first() {
    let mut rt = Runtime::from_source(
        r#"
        fn leaf()
            try {
                yield 1
            } catch Exception $e {
                yield "leaf caught"
            }
        end

        fn middle()
            yield from leaf()
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("middle", vec![]).unwrap();
    let next = rt.throw(&g, Exception::new("Exception", "boom")).unwrap();
    assert_eq!(next, Some(Value::str("leaf caught")));
}

#[test]
fn yield_from_finished_generator() {
    let mut rt = Runtime::from_source(
        r#"
        fn five()
            return 5
        end

        fn broken()
            throw new Exception("never returns")
        end

        fn outer()
            $g = five()
            $g->next()
            $r = yield from $g
            yield $r
            $b = broken()
            try {
                $b->next()
            } catch Exception $e {
                echo "first"
            }
            try {
                $r = yield from $b
            } catch Error $e {
                yield $e
            }
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("outer", vec![]).unwrap();
    assert_eq!(rt.current(&g).unwrap(), Some(Value::Int(5)));
    rt.next(&g).unwrap();
    assert_eq!(rt.take_output(), vec!["first".to_string()]);
    match rt.current(&g).unwrap() {
        Some(Value::Exception(e)) => assert_eq!(
            e.message(),
            "Generator passed to yield from was aborted without proper return and is unable to continue"
        ),
        other => panic!("expected an Error, got {other:?}"),
    }
}

fn register_me(rt: &mut Runtime<Interpreter>) -> Rc<RefCell<Option<GeneratorRef>>> {
    let slot: Rc<RefCell<Option<GeneratorRef>>> = Rc::new(RefCell::new(None));
    let captured = slot.clone();
    rt.executor
        .register_native("me", move |_, _, _| Ok(captured.borrow().clone().map(Value::Generator).unwrap_or(Value::Null)));
    slot
}

#[test]
fn yield_from_self_and_reentrant_resume_raise() {
    let mut rt = Runtime::from_source(
        r#"
        fn selfish()
            $me = me()
            try {
                yield from $me
            } catch Error $e {
                yield $e
            }
            try {
                $me->next()
            } catch Error $e {
                yield $e
            }
        end
        "#,
    )
    .unwrap();
    let slot = register_me(&mut rt);
    let g = rt.spawn("selfish", vec![]).unwrap();
    *slot.borrow_mut() = Some(g.clone());

    let message = |v: Option<Value>| match v {
        Some(Value::Exception(e)) => e.message().to_string(),
        other => panic!("expected an exception, got {other:?}"),
    };
    assert_eq!(message(rt.current(&g).unwrap()), "Impossible to yield from the Generator being currently run");
    rt.next(&g).unwrap();
    assert_eq!(message(rt.current(&g).unwrap()), "Cannot resume an already running generator");
    *slot.borrow_mut() = None;
}

#[test]
fn destroying_a_delegate_chain_member_detaches_it() {
    let mut rt = Runtime::from_source(CHAIN).unwrap();
    let a = rt.spawn("a", vec![]).unwrap();
    rt.current(&a).unwrap();
    let chain = delegation::chain(&a);
    let b = chain[1].clone();

    rt.destroy(&a).unwrap();
    assert!(a.parent().is_none());
    assert_eq!(b.children_count(), 0);
    assert!(a.is_finished());
    // b still runs on its own
    assert!(!b.is_finished());
}

#[test]
fn destroyed_delegate_raises_closed_generator_exception_in_consumer() {
    let mut rt = Runtime::from_source(
        r#"
        fn inner()
            yield 1
            return "never"
        end

        fn outer()
            try {
                $r = yield from inner()
            } catch ClosedGeneratorException $e {
                yield "caught " . $e
            }
        end
        "#,
    )
    .unwrap();
    let outer = rt.spawn("outer", vec![]).unwrap();
    assert_eq!(rt.current(&outer).unwrap(), Some(Value::Int(1)));
    let inner = outer.parent().unwrap();

    rt.destroy(&inner).unwrap();
    assert!(inner.is_finished());
    assert!(inner.retval().is_none());

    rt.next(&outer).unwrap();
    assert_eq!(
        rt.current(&outer).unwrap(),
        Some(Value::str("caught ClosedGeneratorException: Generator yielded from aborted, no return value available"))
    );
    assert!(outer.parent().is_none());
}

#[test]
fn throw_into_running_generator_is_refused_and_keeps_its_pair() {
    let mut rt = Runtime::from_source(
        r#"
        fn selfish()
            $me = me()
            yield "k" => "first"
            try {
                $me->throw(new LogicException("inside"))
            } catch Error $e {
                $seen = pair()
                yield $e
                yield $seen
            }
        end
        "#,
    )
    .unwrap();
    let slot = register_me(&mut rt);
    let captured = slot.clone();
    rt.executor.register_native("pair", move |_, _, _| {
        let g = captured.borrow().clone();
        Ok(match g {
            Some(g) => Value::list([g.key().unwrap_or(Value::Null), g.value().unwrap_or(Value::Null)]),
            None => Value::Null,
        })
    });
    let g = rt.spawn("selfish", vec![]).unwrap();
    *slot.borrow_mut() = Some(g.clone());

    assert_eq!(rt.current(&g).unwrap(), Some(Value::str("first")));
    rt.next(&g).unwrap();
    match rt.current(&g).unwrap() {
        Some(Value::Exception(e)) => {
            assert_eq!(e.class(), "Error");
            assert_eq!(e.message(), "Cannot resume an already running generator");
        }
        other => panic!("expected the re-entrancy error, got {other:?}"),
    }
    rt.next(&g).unwrap();
    assert_eq!(rt.current(&g).unwrap(), Some(Value::list([Value::str("k"), Value::str("first")])));
    *slot.borrow_mut() = None;
}

#[test]
fn delegate_throwing_into_its_consumer_is_refused() {
    let mut rt = Runtime::from_source(
        r#"
        fn b()
            $a = me()
            yield 1
            try {
                $a->throw(new LogicException("into consumer"))
            } catch Error $e {
                yield $e
            }
        end

        fn a()
            $r = yield from b()
            yield "a-own"
        end
        "#,
    )
    .unwrap();
    let slot = register_me(&mut rt);
    let a = rt.spawn("a", vec![]).unwrap();
    *slot.borrow_mut() = Some(a.clone());

    assert_eq!(rt.current(&a).unwrap(), Some(Value::Int(1)));
    rt.next(&a).unwrap();
    match rt.current(&a).unwrap() {
        Some(Value::Exception(e)) => assert_eq!(e.message(), "Cannot resume an already running generator"),
        other => panic!("expected the re-entrancy error, got {other:?}"),
    }
    // the consumer is still delegating, nothing was raised into it
    assert!(a.parent().is_some());
    rt.next(&a).unwrap();
    assert_eq!(rt.current(&a).unwrap(), Some(Value::str("a-own")));
    *slot.borrow_mut() = None;
}
