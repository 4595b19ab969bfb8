use genvm::{Exception, FunctionBuilder, GeneratorError, Runtime, Value, interp::Op};

const SOURCE: &str = r#"
fn numbers($limit)
    $i = 1
loop:
    $more = $i <= $limit
    if_false $more goto done
    $got = yield $i
    if_false $got goto skip
    echo "numbers() received " . $got
skip:
    $i = $i + 1
    goto loop
done:
    return "counted to " . $limit
end

fn main()
    try {
        $inner = numbers(3)
        $result = yield from $inner
        echo $result
        yield from ["x" => "letters", "y" => "too"]
        $twice = double(21)
        yield $twice
    } finally {
        echo "main() cleaned up"
    }
end
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut rt = Runtime::from_source(SOURCE).map_err(|e| e.to_string())?;
    rt.executor.register_native("double", |_, _, call| match call.arg(0).as_int() {
        Some(i) => Ok(Value::Int(i * 2)),
        None => Err(Exception::new("TypeError", "double() expects an int")),
    });

    // functions can also be built directly
    let mut b = FunctionBuilder::new("answer");
    let x = b.var("x");
    b.emit(Op::Const { dst: x, value: Value::Int(42) });
    b.emit(Op::Yield {
        value: Some(x),
        key: None,
        result: None,
    });
    b.ret(Some(x));
    rt.executor.program_mut().insert(b.finish().map_err(|e| e.to_string())?);

    let main = rt.spawn("main", vec![]).map_err(|e| e.to_string())?;
    let pairs = rt
        .iter(&main, false)
        .map_err(|e| e.to_string())?
        .collect::<Result<Vec<_>, GeneratorError>>()
        .map_err(|e| e.to_string())?;
    for (key, value) in pairs {
        println!("{key:?} => {value:?}");
    }
    for line in rt.take_output() {
        println!("echo: {line}");
    }

    let answer = rt.spawn("answer", vec![]).map_err(|e| e.to_string())?;
    println!("answer yields {:?}", rt.current(&answer).map_err(|e| e.to_string())?);
    // releases the frame suspended at its first yield
    rt.destroy(&answer).map_err(|e| e.to_string())?;
    println!("answer is now {:?}", answer.state());
    Ok(())
}
