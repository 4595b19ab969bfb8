use crate::interp::Op;
use std::fmt;
use std::rc::Rc;

/// One protected region of a function body, as op indices.
///
/// `catch_op`, `finally_op` and `finally_end` are 0 when the part is absent; op 0
/// is always the generator entry marker so no real region starts there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TryCatchRegion {
    pub try_op: usize,
    pub catch_op: usize,
    pub finally_op: usize,
    pub finally_end: usize,
}

impl TryCatchRegion {
    pub fn has_catch(&self) -> bool {
        self.catch_op != 0
    }

    pub fn has_finally(&self) -> bool {
        self.finally_op != 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub has_finally: bool,
    pub returns_reference: bool,
    pub is_closure: bool,
}

/// A compiled generator function.
pub struct Function {
    pub name: Rc<str>,
    pub scope: Option<Rc<str>>,
    pub num_params: usize,
    pub num_vars: usize,
    pub var_names: Vec<Rc<str>>,
    pub code: Vec<Op>,
    /// Regions sorted by `try_op`; nested regions come after their parent.
    pub try_catch: Vec<TryCatchRegion>,
    pub flags: FunctionFlags,
}

impl Function {
    pub fn qualified_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}::{}", self.name),
            None => self.name.to_string(),
        }
    }

    /// True for builder temporaries, which are named `#<slot>`.
    pub fn is_temp(&self, slot: usize) -> bool {
        self.var_names.get(slot).is_some_and(|name| name.starts_with('#'))
    }

    /// Index of the innermost region whose try, catch or finally part covers `op_num`.
    pub fn innermost_region(&self, op_num: usize) -> Option<usize> {
        let mut found = None;
        for (i, region) in self.try_catch.iter().enumerate() {
            if op_num < region.try_op {
                break;
            }
            if op_num < region.catch_op || op_num < region.finally_end {
                found = Some(i);
            }
        }
        found
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.qualified_name())
            .field("num_params", &self.num_params)
            .field("num_vars", &self.num_vars)
            .field("ops", &self.code.len())
            .field("try_catch", &self.try_catch)
            .field("flags", &self.flags)
            .finish()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} ({} vars)", self.qualified_name(), self.num_vars)?;
        for (i, op) in self.code.iter().enumerate() {
            writeln!(f, "  {i:4}: {op:?}")?;
        }
        for (i, r) in self.try_catch.iter().enumerate() {
            writeln!(
                f,
                "  region {i}: try={} catch={} finally={} end={}",
                r.try_op, r.catch_op, r.finally_op, r.finally_end
            )?;
        }
        Ok(())
    }
}
