use crate::core::Value;
use std::fmt;
use std::rc::Rc;

/// Index into the frame's variable table.
pub type Slot = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Concat,
    Lt,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "." => BinaryOp::Concat,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Concat => ".",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// Generator methods callable on a generator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenMethod {
    Current,
    Key,
    Next,
    Send,
    Valid,
    Rewind,
    GetReturn,
    Throw,
}

impl GenMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "current" => GenMethod::Current,
            "key" => GenMethod::Key,
            "next" => GenMethod::Next,
            "send" => GenMethod::Send,
            "valid" => GenMethod::Valid,
            "rewind" => GenMethod::Rewind,
            "getReturn" => GenMethod::GetReturn,
            "throw" => GenMethod::Throw,
            _ => return None,
        })
    }

    pub fn takes_arg(self) -> bool {
        matches!(self, GenMethod::Send | GenMethod::Throw)
    }
}

impl fmt::Display for GenMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenMethod::Current => "current",
            GenMethod::Key => "key",
            GenMethod::Next => "next",
            GenMethod::Send => "send",
            GenMethod::Valid => "valid",
            GenMethod::Rewind => "rewind",
            GenMethod::GetReturn => "getReturn",
            GenMethod::Throw => "throw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Op {
    /// Entry marker, the first resume moves past it.
    Start,
    Nop,
    Const {
        dst: Slot,
        value: Value,
    },
    Move {
        dst: Slot,
        src: Slot,
    },
    Binary {
        op: BinaryOp,
        dst: Slot,
        lhs: Slot,
        rhs: Slot,
    },
    Yield {
        value: Option<Slot>,
        key: Option<Slot>,
        /// Receives the value passed to `send`, null otherwise.
        result: Option<Slot>,
    },
    YieldFrom {
        src: Slot,
        result: Option<Slot>,
    },
    Return {
        src: Option<Slot>,
    },
    Throw {
        src: Slot,
    },
    Jump {
        target: usize,
    },
    JumpIfFalse {
        cond: Slot,
        target: usize,
    },
    /// First op of a catch block. Falls through on a class match, otherwise moves
    /// to the next catch of the same region or rethrows after the last one.
    Catch {
        class: Rc<str>,
        dst: Option<Slot>,
        next: Option<usize>,
    },
    /// Enters the finally block of `region` and comes back to the next op.
    FastCall {
        region: usize,
        retval: Option<Slot>,
    },
    /// Last op of a finally block.
    FastRet {
        region: usize,
    },
    /// `return` inside a finally block drops what that block was holding.
    DiscardFinally {
        region: usize,
    },
    InitCall {
        func: Rc<str>,
        argc: usize,
    },
    SendArg {
        arg: usize,
        src: Slot,
    },
    SendNamed {
        name: Rc<str>,
        src: Slot,
    },
    DoCall {
        dst: Option<Slot>,
    },
    Echo {
        src: Slot,
    },
    NewGenerator {
        dst: Slot,
        func: Rc<str>,
        args: Vec<Slot>,
    },
    NewArray {
        dst: Slot,
        items: Vec<(Option<Slot>, Slot)>,
    },
    NewRange {
        dst: Slot,
        start: Slot,
        end: Slot,
    },
    NewException {
        dst: Slot,
        class: Rc<str>,
        message: Option<Slot>,
    },
    GenCall {
        dst: Option<Slot>,
        method: GenMethod,
        target: Slot,
        arg: Option<Slot>,
    },
    Abort {
        message: Rc<str>,
    },
}
