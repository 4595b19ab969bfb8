use super::op::{Op, Slot};
use crate::core::{Function, FunctionFlags, TryCatchRegion};
use crate::error::GeneratorError;
use crate::internal_error_here;
use indexmap::IndexMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Try,
    Catch,
    Finally,
}

#[derive(Debug)]
struct OpenRegion {
    index: usize,
    phase: Phase,
    /// Jumps to patch once the end of the catch blocks (or of the finally block) is known.
    skips: Vec<usize>,
    last_catch: Option<usize>,
    /// `FastCall`s emitted by returns before it was known whether a finally follows.
    returns: Vec<usize>,
}

/// Emits the code of one generator function.
///
/// Op 0 is always `Start`. Regions are numbered in the order their `try` opens, so
/// an enclosing region always has a lower index than the regions nested in it.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: Rc<str>,
    scope: Option<Rc<str>>,
    flags: FunctionFlags,
    num_params: usize,
    vars: IndexMap<Rc<str>, Slot>,
    code: Vec<Op>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    regions: Vec<TryCatchRegion>,
    open: Vec<OpenRegion>,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        FunctionBuilder {
            name: Rc::from(name),
            scope: None,
            flags: FunctionFlags::default(),
            num_params: 0,
            vars: IndexMap::new(),
            code: vec![Op::Start],
            labels: Vec::new(),
            fixups: Vec::new(),
            regions: Vec::new(),
            open: Vec::new(),
        }
    }

    pub fn scope(&mut self, scope: &str) -> &mut Self {
        self.scope = Some(Rc::from(scope));
        self
    }

    /// Marks the function as yielding by reference.
    pub fn by_reference(&mut self) -> &mut Self {
        self.flags.returns_reference = true;
        self
    }

    pub fn param(&mut self, name: &str) -> Slot {
        let slot = self.var(name);
        self.num_params = self.num_params.max(slot + 1);
        slot
    }

    pub fn var(&mut self, name: &str) -> Slot {
        let next = self.vars.len();
        *self.vars.entry(Rc::from(name)).or_insert(next)
    }

    pub fn temp(&mut self) -> Slot {
        let slot = self.vars.len();
        self.vars.insert(Rc::from(format!("#{slot}")), slot);
        slot
    }

    pub fn next_op(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        if let Some(entry) = self.labels.get_mut(label.0) {
            *entry = Some(self.code.len());
        }
    }

    pub fn jump(&mut self, label: Label) {
        let at = self.emit(Op::Jump { target: usize::MAX });
        self.fixups.push((at, label));
    }

    pub fn jump_if_false(&mut self, cond: Slot, label: Label) {
        let at = self.emit(Op::JumpIfFalse { cond, target: usize::MAX });
        self.fixups.push((at, label));
    }

    fn patch_jump(&mut self, at: usize, to: usize) {
        if let Some(Op::Jump { target } | Op::JumpIfFalse { target, .. }) = self.code.get_mut(at) {
            *target = to;
        }
    }

    pub fn begin_try(&mut self) {
        let index = self.regions.len();
        self.regions.push(TryCatchRegion {
            try_op: self.code.len(),
            ..Default::default()
        });
        self.open.push(OpenRegion {
            index,
            phase: Phase::Try,
            skips: Vec::new(),
            last_catch: None,
            returns: Vec::new(),
        });
    }

    pub fn begin_catch(&mut self, class: &str, dst: Option<Slot>) -> Result<(), GeneratorError> {
        let skip = self.emit(Op::Jump { target: usize::MAX });
        let at = self.code.len();
        let Some(region) = self.open.last_mut() else {
            return Err(internal_error_here!("catch outside of a try block"));
        };
        match region.phase {
            Phase::Try => self.regions[region.index].catch_op = at,
            Phase::Catch => {
                if let Some(Op::Catch { next, .. }) = region.last_catch.and_then(|i| self.code.get_mut(i)) {
                    *next = Some(at);
                }
            }
            Phase::Finally => return Err(internal_error_here!("catch after finally")),
        }
        region.skips.push(skip);
        region.last_catch = Some(at);
        region.phase = Phase::Catch;
        self.code.push(Op::Catch {
            class: Rc::from(class),
            dst,
            next: None,
        });
        Ok(())
    }

    pub fn begin_finally(&mut self) -> Result<(), GeneratorError> {
        let end_of_catches = self.code.len();
        let Some(region) = self.open.last_mut() else {
            return Err(internal_error_here!("finally outside of a try block"));
        };
        if region.phase == Phase::Finally {
            return Err(internal_error_here!("duplicate finally block"));
        }
        let index = region.index;
        let skips = std::mem::take(&mut region.skips);
        for at in skips {
            self.patch_jump(at, end_of_catches);
        }

        self.code.push(Op::FastCall { region: index, retval: None });
        let skip = self.emit(Op::Jump { target: usize::MAX });
        self.regions[index].finally_op = self.code.len();
        self.flags.has_finally = true;
        if let Some(region) = self.open.last_mut() {
            region.skips.push(skip);
            region.phase = Phase::Finally;
        }
        Ok(())
    }

    pub fn end_try(&mut self) -> Result<(), GeneratorError> {
        let Some(region) = self.open.pop() else {
            return Err(internal_error_here!("end of try without a try block"));
        };
        match region.phase {
            Phase::Try => return Err(internal_error_here!("try block without catch or finally")),
            Phase::Catch => {
                for at in region.returns {
                    self.code[at] = Op::Nop;
                }
            }
            Phase::Finally => {
                self.regions[region.index].finally_end = self.code.len();
                self.code.push(Op::FastRet { region: region.index });
            }
        }
        let end = self.code.len();
        for at in region.skips {
            self.patch_jump(at, end);
        }
        Ok(())
    }

    /// Emits `return`, running every enclosing finally block first.
    ///
    /// The value is copied to a temporary so the finally code cannot change it.
    pub fn ret(&mut self, src: Option<Slot>) {
        let mut src = src;
        if self.open.iter().any(|r| r.phase != Phase::Finally)
            && let Some(value) = src
        {
            let tmp = self.temp();
            self.emit(Op::Move { dst: tmp, src: value });
            src = Some(tmp);
        }
        for i in (0..self.open.len()).rev() {
            let region = self.open[i].index;
            match self.open[i].phase {
                Phase::Try | Phase::Catch => {
                    let at = self.emit(Op::FastCall { region, retval: src });
                    self.open[i].returns.push(at);
                }
                Phase::Finally => {
                    self.emit(Op::DiscardFinally { region });
                }
            }
        }
        self.emit(Op::Return { src });
    }

    pub fn finish(mut self) -> Result<Rc<Function>, GeneratorError> {
        if !self.open.is_empty() {
            return Err(internal_error_here!(format!("{} unclosed try block(s) in {}", self.open.len(), self.name)));
        }
        self.code.push(Op::Return { src: None });
        for (at, label) in std::mem::take(&mut self.fixups) {
            let Some(to) = self.labels.get(label.0).copied().flatten() else {
                return Err(internal_error_here!(format!("unbound label in {}", self.name)));
            };
            self.patch_jump(at, to);
        }

        Ok(Rc::new(Function {
            name: self.name,
            scope: self.scope,
            num_params: self.num_params,
            num_vars: self.vars.len(),
            var_names: self.vars.into_keys().collect(),
            code: self.code,
            try_catch: self.regions,
            flags: self.flags,
        }))
    }
}
