use crate::{
    GeneratorError,
    core::{Exception, GcRef, Value},
    generator::GeneratorRef,
    interp::{Interpreter, Program, assemble, parse_literal},
    runtime::Runtime,
};

/// A persistent stepping session over generator functions.
///
/// Notes:
/// - input starting with `fn` is assembled and added to the session program, a
///   function with an existing name replaces the old one.
/// - `start NAME [ARGS...]` creates a generator and selects it; the remaining
///   commands (`next`, `send`, `throw`, `current`, `key`, `valid`, `return`,
///   `destroy`, `gc`, `list`, `select`, `program`) act on the selected generator.
pub struct Repl {
    runtime: Runtime<Interpreter>,
    generators: Vec<GeneratorRef>,
    selected: Option<usize>,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Repl {
            runtime: Runtime::new(Interpreter::new(Program::new())),
            generators: Vec::new(),
            selected: None,
        }
    }

    pub fn is_complete_input(src: &str) -> bool {
        crate::repl_utils::is_complete_input(src)
    }

    pub fn runtime(&self) -> &Runtime<Interpreter> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<Interpreter> {
        &mut self.runtime
    }

    /// Runs one REPL submission and returns the text to show.
    pub fn eval<T: AsRef<str>>(&mut self, input: T) -> Result<String, GeneratorError> {
        let input = input.as_ref().trim();
        if input.starts_with("fn ") || input.starts_with("fn\t") {
            return self.define(input);
        }

        let (command, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        let rest = rest.trim();
        let mut out = match command {
            "start" => self.start(rest)?,
            "list" => self.list(),
            "select" => self.select(rest)?,
            "program" => self.runtime.executor.program().to_string(),
            "next" => {
                let g = self.selected()?;
                self.runtime.next(&g)?;
                self.position(&g)?
            }
            "send" => {
                let g = self.selected()?;
                let value = literal(rest)?;
                self.runtime.send(&g, value)?;
                self.position(&g)?
            }
            "throw" => {
                let g = self.selected()?;
                let (class, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let class = if class.is_empty() { "Exception" } else { class };
                self.runtime.throw(&g, Exception::new(class, message.trim()))?;
                self.position(&g)?
            }
            "current" => {
                let g = self.selected()?;
                self.runtime.current(&g)?.unwrap_or(Value::Null).to_string()
            }
            "key" => {
                let g = self.selected()?;
                self.runtime.key(&g)?.unwrap_or(Value::Null).to_string()
            }
            "valid" => {
                let g = self.selected()?;
                self.runtime.valid(&g)?.to_string()
            }
            "return" => {
                let g = self.selected()?;
                self.runtime.get_return(&g)?.to_string()
            }
            "destroy" => {
                let g = self.selected()?;
                self.runtime.destroy(&g)?;
                format!("{:?}", g.state())
            }
            "gc" => {
                let g = self.selected()?;
                let buf = self.runtime.get_gc(&g);
                if buf.is_deferred() {
                    "deferred".to_string()
                } else {
                    buf.refs().iter().map(describe_ref).collect::<Vec<_>>().join("\n")
                }
            }
            other => {
                return Err(GeneratorError::Asm {
                    line: 1,
                    message: format!("unknown command '{other}'"),
                });
            }
        };

        let output = self.runtime.take_output();
        if !output.is_empty() {
            let echoed = output.join("\n");
            out = if out.is_empty() { echoed } else { format!("{echoed}\n{out}") };
        }
        Ok(out)
    }

    fn define(&mut self, source: &str) -> Result<String, GeneratorError> {
        let program = assemble(source)?;
        let mut names = Vec::new();
        for function in program.functions() {
            names.push(function.qualified_name());
            self.runtime.executor.program_mut().insert(function.clone());
        }
        Ok(format!("defined {}", names.join(", ")))
    }

    fn start(&mut self, args: &str) -> Result<String, GeneratorError> {
        let mut parts = args.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(usage("start NAME [ARGS...]"));
        };
        let args = parts.map(literal).collect::<Result<Vec<_>, _>>()?;
        let g = self.runtime.spawn(name, args)?;
        self.generators.push(g.clone());
        self.selected = Some(self.generators.len() - 1);
        log::debug!("repl started generator #{}", g.id());
        Ok(format!("[{}] {}", self.generators.len() - 1, Value::Generator(g)))
    }

    fn list(&self) -> String {
        self.generators
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let mark = if self.selected == Some(i) { "*" } else { " " };
                format!("{mark}[{i}] {} {:?}", Value::Generator(g.clone()), g.state())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn select(&mut self, index: &str) -> Result<String, GeneratorError> {
        match index.parse::<usize>() {
            Ok(i) if i < self.generators.len() => {
                self.selected = Some(i);
                Ok(format!("[{i}] {}", Value::Generator(self.generators[i].clone())))
            }
            _ => Err(usage("select INDEX")),
        }
    }

    fn selected(&self) -> Result<GeneratorRef, GeneratorError> {
        self.selected
            .and_then(|i| self.generators.get(i))
            .cloned()
            .ok_or_else(|| usage("start a generator first"))
    }

    fn position(&mut self, g: &GeneratorRef) -> Result<String, GeneratorError> {
        if !self.runtime.valid(g)? {
            return Ok(match g.retval() {
                Some(retval) => format!("finished, returned {retval}"),
                None => "finished".to_string(),
            });
        }
        let key = self.runtime.key(g)?.unwrap_or(Value::Null);
        let value = self.runtime.current(g)?.unwrap_or(Value::Null);
        Ok(format!("{key:?} => {value:?}"))
    }
}

fn literal(text: &str) -> Result<Value, GeneratorError> {
    parse_literal(text).ok_or_else(|| usage(&format!("'{text}' is not a literal")))
}

fn usage(message: &str) -> GeneratorError {
    GeneratorError::Asm {
        line: 1,
        message: message.to_string(),
    }
}

fn describe_ref(r: &GcRef) -> String {
    match r {
        GcRef::Value(value) => format!("{value:?}"),
        GcRef::Generator(g) => format!("-> {}", Value::Generator(g.clone())),
    }
}
