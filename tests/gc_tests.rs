use genvm::{GcBuffer, GeneratorRef, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn suspended_frame_reports_its_locals() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            $a = [1, 2]
            $s = "plain"
            yield 1
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("g", vec![]).unwrap();
    rt.current(&g).unwrap();

    let buf = rt.get_gc(&g);
    assert!(!buf.is_deferred());
    assert!(buf.contains_value(&Value::list([Value::Int(1), Value::Int(2)])));
    // scalars and strings never take part in cycles
    assert!(!buf.contains_value(&Value::str("plain")));
    assert!(!buf.contains_value(&Value::Int(1)));
}

#[test]
fn consumer_reports_its_delegate_but_not_the_reverse() {
    let mut rt = Runtime::from_source(
        r#"
        fn inner()
            yield 1
        end

        fn outer()
            yield from inner()
        end
        "#,
    )
    .unwrap();
    let outer = rt.spawn("outer", vec![]).unwrap();
    rt.current(&outer).unwrap();
    let inner = outer.parent().unwrap();

    assert!(rt.get_gc(&outer).contains_generator(&inner));
    assert!(!rt.get_gc(&inner).contains_generator(&outer));
}

#[test]
fn delegated_array_is_reported_until_exhausted() {
    let mut rt = Runtime::from_source(
        r#"
        fn spread($a)
            yield from $a
            yield "own"
        end
        "#,
    )
    .unwrap();
    let array = Value::list([Value::Int(7), Value::Int(8)]);
    let g = rt.spawn("spread", vec![array.clone()]).unwrap();
    rt.current(&g).unwrap();
    assert!(g.has_delegation_source());
    assert!(rt.get_gc(&g).contains_value(&array));
}

#[test]
fn frozen_call_arguments_are_reported() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            $n = count([7, 8, 9], yield 1)
            yield $n
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("g", vec![]).unwrap();
    rt.current(&g).unwrap();
    assert!(g.has_frozen_calls());
    let list = Value::list([Value::Int(7), Value::Int(8), Value::Int(9)]);
    assert!(rt.get_gc(&g).contains_value(&list));

    assert_eq!(rt.send(&g, Value::Null).unwrap(), Some(Value::Int(3)));
}

#[test]
fn running_generator_defers_its_report() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            $a = [1]
            probe()
            yield 1
        end
        "#,
    )
    .unwrap();
    let slot: Rc<RefCell<Option<GeneratorRef>>> = Rc::new(RefCell::new(None));
    let seen = Rc::new(Cell::new(None));
    {
        let (slot, seen) = (slot.clone(), seen.clone());
        rt.executor.register_native("probe", move |interp, _, _| {
            if let Some(g) = slot.borrow().as_ref() {
                let mut buf = GcBuffer::new();
                genvm::iterator::get_gc(&*interp, g, &mut buf);
                seen.set(Some((buf.is_deferred(), buf.len())));
            }
            Ok(Value::Null)
        });
    }
    let g = rt.spawn("g", vec![]).unwrap();
    *slot.borrow_mut() = Some(g.clone());
    rt.current(&g).unwrap();
    *slot.borrow_mut() = None;

    assert_eq!(seen.get(), Some((true, 0)));
    assert!(!rt.get_gc(&g).is_deferred());
}

#[test]
fn finished_generator_reports_only_its_result_slots() {
    let mut rt = Runtime::from_source(
        r#"
        fn g()
            $local = [9]
            yield 1
            return [2]
        end
        "#,
    )
    .unwrap();
    let g = rt.spawn("g", vec![]).unwrap();
    rt.current(&g).unwrap();
    assert!(rt.get_gc(&g).contains_value(&Value::list([Value::Int(9)])));
    rt.next(&g).unwrap();
    assert!(g.is_finished());

    let buf = rt.get_gc(&g);
    assert!(buf.contains_value(&Value::list([Value::Int(2)])));
    assert!(!buf.contains_value(&Value::list([Value::Int(9)])));
    assert_eq!(buf.len(), 1);
}
