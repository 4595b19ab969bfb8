//! Line-oriented assembly for generator functions.
//!
//! ```text
//! fn Repo::items($limit)
//!     $i = 0
//! loop:
//!     $more = $i < $limit
//!     if_false $more goto done
//!     $sent = yield $i => $i * 10
//!     $i = $i + 1
//!     goto loop
//! done:
//!     try {
//!         yield from [1, 2]
//!     } catch Exception $e {
//!         echo $e
//!     } finally {
//!         echo "cleanup"
//!     }
//!     return $i
//! end
//! ```

use super::builder::{FunctionBuilder, Label};
use super::op::{BinaryOp, GenMethod, Op, Slot};
use super::Program;
use crate::core::Value;
use crate::error::GeneratorError;
use indexmap::IndexMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Var(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'static str),
}

const PUNCTS: [&str; 21] = [
    "=>", "->", "<=", "==", "!=", "::", "(", ")", "[", "]", "{", "}", ",", "=", "+", "-", "*", ".", "<", ":", "&",
];

fn lex(line: usize, text: &str) -> Result<Vec<Tok>, GeneratorError> {
    let err = |message: String| GeneratorError::Asm { line, message };
    let chars: Vec<char> = text.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' || (c == '/' && chars.get(i + 1) == Some(&'/')) {
            break;
        }
        let negative = c == '-'
            && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())
            && !matches!(toks.last(), Some(Tok::Var(_) | Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::Ident(_) | Tok::Punct(")" | "]")));
        if c.is_ascii_digit() || negative {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit());
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            toks.push(if is_float {
                Tok::Float(literal.parse().map_err(|_| err(format!("bad number {literal}")))?)
            } else {
                Tok::Int(literal.parse().map_err(|_| err(format!("bad number {literal}")))?)
            });
            continue;
        }
        if c == '$' || c.is_alphabetic() || c == '_' {
            let start = if c == '$' { i + 1 } else { i };
            i = start;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            if name.is_empty() {
                return Err(err("expected a variable name after '$'".to_string()));
            }
            toks.push(if c == '$' { Tok::Var(name) } else { Tok::Ident(name) });
            continue;
        }
        if c == '"' {
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(err("unterminated string".to_string())),
                    Some('"') => break,
                    Some('\\') => {
                        i += 1;
                        match chars.get(i) {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(*other),
                            None => return Err(err("unterminated string".to_string())),
                        }
                    }
                    Some(other) => s.push(*other),
                }
                i += 1;
            }
            i += 1;
            toks.push(Tok::Str(s));
            continue;
        }
        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match PUNCTS.iter().copied().find(|p| rest.starts_with(p)) {
            Some(p) => {
                toks.push(Tok::Punct(p));
                i += p.len();
            }
            None => return Err(err(format!("unexpected character '{c}'"))),
        }
    }
    Ok(toks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Try,
    Catch,
    Finally,
}

struct FnState {
    builder: FunctionBuilder,
    labels: IndexMap<String, Label>,
    blocks: Vec<Block>,
    start_line: usize,
}

impl FnState {
    fn label(&mut self, name: &str) -> Label {
        if let Some(label) = self.labels.get(name) {
            return *label;
        }
        let label = self.builder.label();
        self.labels.insert(name.to_string(), label);
        label
    }
}

/// Parser over the tokens of one line, emitting into the current function.
struct Line<'a> {
    toks: Vec<Tok>,
    pos: usize,
    line: usize,
    f: &'a mut FnState,
}

impl Line<'_> {
    fn err(&self, message: impl Into<String>) -> GeneratorError {
        GeneratorError::Asm {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.toks.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(Tok::Punct(q)) if *q == p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(n)) if n == name)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), GeneratorError> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{p}'{}", self.found())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, GeneratorError> {
        match self.bump() {
            Some(Tok::Ident(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.err(format!("expected a name{}", self.found())))
            }
        }
    }

    fn expect_end(&self) -> Result<(), GeneratorError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.err(format!("unexpected trailing input{}", self.found())))
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(tok) => format!(", found {tok:?}"),
            None => ", found end of line".to_string(),
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.f.builder.emit(op)
    }

    fn constant(&mut self, value: Value) -> Slot {
        let dst = self.f.builder.temp();
        self.emit(Op::Const { dst, value });
        dst
    }

    /// Ends an expression list element.
    fn at_stop(&self) -> bool {
        self.at_end() || self.is_punct(")") || self.is_punct(",") || self.is_punct("]") || self.is_punct("=>")
    }

    fn expr(&mut self) -> Result<Slot, GeneratorError> {
        if self.is_ident("yield_from") || (self.is_ident("yield") && matches!(self.peek_at(1), Some(Tok::Ident(n)) if n == "from")) {
            let skip = if self.is_ident("yield_from") { 1 } else { 2 };
            self.pos += skip;
            let src = self.binary()?;
            let result = self.f.builder.temp();
            self.emit(Op::YieldFrom { src, result: Some(result) });
            return Ok(result);
        }
        if self.is_ident("yield") {
            self.pos += 1;
            let (mut value, mut key) = (None, None);
            if !self.at_stop() {
                value = Some(self.binary()?);
                if self.eat("=>") {
                    key = value;
                    value = Some(self.binary()?);
                }
            }
            let result = self.f.builder.temp();
            self.emit(Op::Yield {
                value,
                key,
                result: Some(result),
            });
            return Ok(result);
        }
        self.binary()
    }

    fn binary(&mut self) -> Result<Slot, GeneratorError> {
        let mut lhs = self.postfix()?;
        while let Some(Tok::Punct(p)) = self.peek() {
            let Some(op) = BinaryOp::from_symbol(p) else { break };
            self.pos += 1;
            let rhs = self.postfix()?;
            let dst = self.f.builder.temp();
            self.emit(Op::Binary { op, dst, lhs, rhs });
            lhs = dst;
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> Result<Slot, GeneratorError> {
        let mut target = self.primary()?;
        while self.eat("->") {
            let name = self.expect_ident()?;
            let Some(method) = GenMethod::from_name(&name) else {
                return Err(self.err(format!("unknown generator method {name}()")));
            };
            self.expect("(")?;
            let arg = if self.is_punct(")") { None } else { Some(self.expr()?) };
            self.expect(")")?;
            if method.takes_arg() && arg.is_none() {
                return Err(self.err(format!("{name}() expects one argument")));
            }
            let dst = self.f.builder.temp();
            self.emit(Op::GenCall {
                dst: Some(dst),
                method,
                target,
                arg,
            });
            target = dst;
        }
        Ok(target)
    }

    fn primary(&mut self) -> Result<Slot, GeneratorError> {
        let Some(tok) = self.bump() else {
            return Err(self.err("expected an expression, found end of line"));
        };
        match tok {
            Tok::Var(name) => Ok(self.f.builder.var(&name)),
            Tok::Int(i) => Ok(self.constant(Value::Int(i))),
            Tok::Float(x) => Ok(self.constant(Value::Float(x))),
            Tok::Str(s) => Ok(self.constant(Value::str(&s))),
            Tok::Punct("(") => {
                let slot = self.expr()?;
                self.expect(")")?;
                Ok(slot)
            }
            Tok::Punct("[") => self.array(),
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok(self.constant(Value::Bool(true))),
                "false" => Ok(self.constant(Value::Bool(false))),
                "null" => Ok(self.constant(Value::Null)),
                "new" => {
                    let class = self.expect_ident()?;
                    self.expect("(")?;
                    let message = if self.is_punct(")") { None } else { Some(self.expr()?) };
                    self.expect(")")?;
                    let dst = self.f.builder.temp();
                    self.emit(Op::NewException {
                        dst,
                        class: Rc::from(class),
                        message,
                    });
                    Ok(dst)
                }
                "range" => {
                    self.expect("(")?;
                    let start = self.expr()?;
                    self.expect(",")?;
                    let end = self.expr()?;
                    self.expect(")")?;
                    let dst = self.f.builder.temp();
                    self.emit(Op::NewRange { dst, start, end });
                    Ok(dst)
                }
                "gen" => {
                    let func = self.expect_ident()?;
                    self.expect("(")?;
                    let mut args = Vec::new();
                    while !self.is_punct(")") {
                        args.push(self.expr()?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                    self.expect(")")?;
                    let dst = self.f.builder.temp();
                    self.emit(Op::NewGenerator {
                        dst,
                        func: Rc::from(func),
                        args,
                    });
                    Ok(dst)
                }
                _ if self.is_punct("(") => self.call(&name),
                _ => Err(self.err(format!("unexpected name {name}"))),
            },
            Tok::Punct(p) => Err(self.err(format!("unexpected '{p}'"))),
        }
    }

    fn array(&mut self) -> Result<Slot, GeneratorError> {
        let mut items = Vec::new();
        while !self.is_punct("]") {
            let first = self.expr()?;
            if self.eat("=>") {
                let value = self.expr()?;
                items.push((Some(first), value));
            } else {
                items.push((None, first));
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]")?;
        let dst = self.f.builder.temp();
        self.emit(Op::NewArray { dst, items });
        Ok(dst)
    }

    /// Counts the positional arguments of the call whose `(` is next.
    fn count_positional(&self) -> Result<usize, GeneratorError> {
        let mut depth = 0usize;
        let mut count = 0;
        let mut arg_start = true;
        let mut named_seen = false;
        for (i, tok) in self.toks.iter().enumerate().skip(self.pos) {
            if depth == 1 && arg_start && *tok != Tok::Punct(")") {
                arg_start = false;
                if matches!(tok, Tok::Ident(_)) && self.toks.get(i + 1) == Some(&Tok::Punct(":")) {
                    named_seen = true;
                } else if named_seen {
                    return Err(self.err("Cannot use positional argument after named argument"));
                } else {
                    count += 1;
                }
            }
            match tok {
                Tok::Punct("(" | "[") => depth += 1,
                Tok::Punct(")" | "]") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(count);
                    }
                }
                Tok::Punct(",") if depth == 1 => arg_start = true,
                _ => {}
            }
        }
        Err(self.err("unbalanced parentheses in call"))
    }

    /// Arguments are evaluated after the call is pushed, so a `yield` inside the
    /// argument list suspends with the call pending.
    fn call(&mut self, name: &str) -> Result<Slot, GeneratorError> {
        let argc = self.count_positional()?;
        self.expect("(")?;
        self.emit(Op::InitCall {
            func: Rc::from(name),
            argc,
        });
        let mut arg = 0;
        while !self.is_punct(")") {
            let named = match (self.peek(), self.peek_at(1)) {
                (Some(Tok::Ident(param)), Some(Tok::Punct(":"))) => Some(param.clone()),
                _ => None,
            };
            match named {
                Some(param) => {
                    self.pos += 2;
                    let src = self.expr()?;
                    self.emit(Op::SendNamed {
                        name: Rc::from(param),
                        src,
                    });
                }
                None => {
                    let src = self.expr()?;
                    self.emit(Op::SendArg { arg, src });
                    arg += 1;
                }
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")")?;
        let dst = self.f.builder.temp();
        self.emit(Op::DoCall { dst: Some(dst) });
        Ok(dst)
    }

    fn statement(&mut self) -> Result<(), GeneratorError> {
        match (self.peek().cloned(), self.peek_at(1).cloned()) {
            (Some(Tok::Ident(label)), Some(Tok::Punct(":"))) if self.toks.len() == 2 => {
                let label = self.f.label(&label);
                self.f.builder.bind(label);
                Ok(())
            }
            (Some(Tok::Var(name)), Some(Tok::Punct("="))) => {
                self.pos += 2;
                let src = self.expr()?;
                self.expect_end()?;
                let dst = self.f.builder.var(&name);
                self.emit(Op::Move { dst, src });
                Ok(())
            }
            (Some(Tok::Ident(keyword)), _) => self.keyword(&keyword),
            (Some(Tok::Punct("}")), _) => self.close_block(),
            _ => {
                self.expr()?;
                self.expect_end()
            }
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), GeneratorError> {
        match keyword {
            "return" => {
                self.pos += 1;
                let src = if self.at_end() { None } else { Some(self.expr()?) };
                self.expect_end()?;
                self.f.builder.ret(src);
            }
            "throw" => {
                self.pos += 1;
                let src = self.expr()?;
                self.expect_end()?;
                self.emit(Op::Throw { src });
            }
            "echo" => {
                self.pos += 1;
                let src = self.expr()?;
                self.expect_end()?;
                self.emit(Op::Echo { src });
            }
            "goto" => {
                self.pos += 1;
                let name = self.expect_ident()?;
                self.expect_end()?;
                let label = self.f.label(&name);
                self.f.builder.jump(label);
            }
            "if_false" => {
                self.pos += 1;
                let cond = self.expr()?;
                if !self.is_ident("goto") {
                    return Err(self.err(format!("expected 'goto'{}", self.found())));
                }
                self.pos += 1;
                let name = self.expect_ident()?;
                self.expect_end()?;
                let label = self.f.label(&name);
                self.f.builder.jump_if_false(cond, label);
            }
            "abort" => {
                self.pos += 1;
                let message = match self.bump() {
                    Some(Tok::Str(s)) => s,
                    None => "aborted".to_string(),
                    Some(_) => return Err(self.err("abort takes a string literal")),
                };
                self.expect_end()?;
                self.emit(Op::Abort { message: Rc::from(message) });
            }
            "try" => {
                self.pos += 1;
                self.expect("{")?;
                self.expect_end()?;
                self.f.builder.begin_try();
                self.f.blocks.push(Block::Try);
            }
            "fn" => return Err(self.err("functions cannot be nested")),
            _ => {
                self.expr()?;
                self.expect_end()?;
            }
        }
        Ok(())
    }

    fn close_block(&mut self) -> Result<(), GeneratorError> {
        self.pos += 1;
        let Some(block) = self.f.blocks.pop() else {
            return Err(self.err("unmatched '}'"));
        };
        let line = self.line;
        let build_err = |err: GeneratorError| GeneratorError::Asm { line, message: err.to_string() };

        if self.is_ident("catch") {
            if block == Block::Finally {
                return Err(self.err("catch after finally"));
            }
            self.pos += 1;
            let class = self.expect_ident()?;
            let dst = match self.peek() {
                Some(Tok::Var(name)) => {
                    let name = name.clone();
                    self.pos += 1;
                    Some(self.f.builder.var(&name))
                }
                _ => None,
            };
            self.expect("{")?;
            self.expect_end()?;
            self.f.builder.begin_catch(&class, dst).map_err(build_err)?;
            self.f.blocks.push(Block::Catch);
        } else if self.is_ident("finally") {
            if block == Block::Finally {
                return Err(self.err("duplicate finally"));
            }
            self.pos += 1;
            self.expect("{")?;
            self.expect_end()?;
            self.f.builder.begin_finally().map_err(build_err)?;
            self.f.blocks.push(Block::Finally);
        } else {
            self.expect_end()?;
            if block == Block::Try {
                return Err(self.err("try needs a catch or finally block"));
            }
            self.f.builder.end_try().map_err(build_err)?;
        }
        Ok(())
    }
}

fn function_header(line: usize, toks: &[Tok]) -> Result<FnState, GeneratorError> {
    let err = |message: &str| GeneratorError::Asm {
        line,
        message: message.to_string(),
    };
    let mut pos = 1;
    let by_ref = toks.get(pos) == Some(&Tok::Punct("&"));
    if by_ref {
        pos += 1;
    }
    let Some(Tok::Ident(first)) = toks.get(pos) else {
        return Err(err("expected a function name"));
    };
    pos += 1;
    let (scope, name) = if toks.get(pos) == Some(&Tok::Punct("::")) {
        let Some(Tok::Ident(name)) = toks.get(pos + 1) else {
            return Err(err("expected a method name after '::'"));
        };
        pos += 2;
        (Some(first.as_str()), name.as_str())
    } else {
        (None, first.as_str())
    };

    let mut builder = FunctionBuilder::new(name);
    if let Some(scope) = scope {
        builder.scope(scope);
    }
    if by_ref {
        builder.by_reference();
    }
    if toks.get(pos) != Some(&Tok::Punct("(")) {
        return Err(err("expected '(' after the function name"));
    }
    pos += 1;
    loop {
        match toks.get(pos) {
            Some(Tok::Punct(")")) => {
                pos += 1;
                break;
            }
            Some(Tok::Var(param)) => {
                builder.param(param);
                pos += 1;
                if toks.get(pos) == Some(&Tok::Punct(",")) {
                    pos += 1;
                }
            }
            _ => return Err(err("expected a parameter or ')'")),
        }
    }
    if pos != toks.len() {
        return Err(err("unexpected input after the parameter list"));
    }
    Ok(FnState {
        builder,
        labels: IndexMap::new(),
        blocks: Vec::new(),
        start_line: line,
    })
}

/// Parses a single literal: a number, a quoted string, `true`, `false` or `null`.
pub fn parse_literal(text: &str) -> Option<Value> {
    let toks = lex(0, text).ok()?;
    match toks.as_slice() {
        [Tok::Int(i)] => Some(Value::Int(*i)),
        [Tok::Float(x)] => Some(Value::Float(*x)),
        [Tok::Str(s)] => Some(Value::str(s)),
        [Tok::Ident(name)] => match name.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            _ => None,
        },
        _ => None,
    }
}

/// Compiles assembly source into a program.
pub fn assemble(source: &str) -> Result<Program, GeneratorError> {
    let mut program = Program::new();
    let mut current: Option<FnState> = None;

    for (index, text) in source.lines().enumerate() {
        let line = index + 1;
        let toks = lex(line, text)?;
        if toks.is_empty() {
            continue;
        }
        let err = |message: String| GeneratorError::Asm { line, message };

        let is_keyword = |kw: &str| matches!(&toks[0], Tok::Ident(name) if name == kw);
        let Some(f) = current.as_mut() else {
            if !is_keyword("fn") {
                return Err(err("statement outside of a function".to_string()));
            }
            current = Some(function_header(line, &toks)?);
            continue;
        };
        if is_keyword("end") && toks.len() == 1 {
            if !f.blocks.is_empty() {
                return Err(err("unclosed block before 'end'".to_string()));
            }
            let Some(f) = current.take() else { continue };
            let function = f.builder.finish().map_err(|e| err(e.to_string()))?;
            if program.get(&function.name).is_some() {
                return Err(err(format!("function {} already defined", function.name)));
            }
            log::trace!("assembled {}", function.qualified_name());
            program.insert(function);
            continue;
        }
        let mut parser = Line { toks, pos: 0, line, f };
        parser.statement()?;
    }

    if let Some(f) = current {
        return Err(GeneratorError::Asm {
            line: f.start_line,
            message: "function is missing 'end'".to_string(),
        });
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_numbers_strings_and_operators() {
        let toks = lex(1, r#"$x = -3 + 1.5 . "a\"b" // trailing"#).unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Var("x".into()),
                Tok::Punct("="),
                Tok::Int(-3),
                Tok::Punct("+"),
                Tok::Float(1.5),
                Tok::Punct("."),
                Tok::Str("a\"b".into()),
            ]
        );
        assert_eq!(lex(1, "$a - 1").unwrap()[1], Tok::Punct("-"));
    }

    #[test]
    fn call_arguments_are_sent_after_the_call_is_pushed() {
        let program = assemble(
            r#"
            fn main()
                $r = f(1, yield, flag: true)
            end
            "#,
        )
        .unwrap();
        let code = &program.get("main").unwrap().code;
        let init = code.iter().position(|op| matches!(op, Op::InitCall { argc: 2, .. })).unwrap();
        let yield_at = code.iter().position(|op| matches!(op, Op::Yield { .. })).unwrap();
        let call = code.iter().position(|op| matches!(op, Op::DoCall { .. })).unwrap();
        assert!(init < yield_at && yield_at < call);
        assert!(code.iter().any(|op| matches!(op, Op::SendNamed { .. })));
    }

    #[test]
    fn scoped_by_reference_header() {
        let program = assemble("fn &Repo::items($a, $b)\nend").unwrap();
        let f = program.get("items").unwrap();
        assert_eq!(f.qualified_name(), "Repo::items");
        assert_eq!(f.num_params, 2);
        assert!(f.flags.returns_reference);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = assemble("fn f()\n  $x = (1\nend").unwrap_err();
        assert!(matches!(err, GeneratorError::Asm { line: 2, .. }), "{err}");
        let err = assemble("fn f()\n  try {\n  }\nend").unwrap_err();
        assert!(matches!(err, GeneratorError::Asm { line: 3, .. }), "{err}");
        let err = assemble("fn f()\n  yield 1\n").unwrap_err();
        assert!(matches!(err, GeneratorError::Asm { line: 1, .. }), "{err}");
        assert!(assemble("yield 1").is_err());
        assert!(assemble("fn f()\nend\nfn f()\nend").is_err());
    }

    #[test]
    fn literals() {
        assert_eq!(parse_literal("-4"), Some(Value::Int(-4)));
        assert_eq!(parse_literal(r#""a b""#), Some(Value::str("a b")));
        assert_eq!(parse_literal("null"), Some(Value::Null));
        assert_eq!(parse_literal("1 2"), None);
        assert_eq!(parse_literal("$x"), None);
    }

    #[test]
    fn positional_after_named_is_rejected() {
        let err = assemble("fn f()\n  g(a: 1, 2)\nend").unwrap_err();
        assert!(err.to_string().contains("positional argument after named"));
    }
}
