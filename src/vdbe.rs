//! Virtual machine (C6, §4.6): opcode program builder and bytecode
//! interpreter.
//!
//! Grounded on `camdencheek-sqlite_rs/src/vdbe.rs`. The teacher's `Vdbe`
//! carries raw pointers into its own opcode array for the program counter
//! and a `union` for the aggregate context; here the program counter is a
//! plain `usize` index and the aggregate context lives behind
//! [`crate::agg::AggContext`], an ordinary owned field.

use std::collections::HashMap;

use crate::agg::AggContext;
use crate::error::{Error, Result};
use crate::func::FuncRegistry;
use crate::mem::Value;
use crate::opcodes::{ArithOp, Instruction, Op, P4};
use crate::record::{compare_values, decode_record, encode_record};
use crate::rowset::RowSet;
use crate::storage::{RootId, SeekMatch, Storage};

/// The program's lifecycle tag (§3 "Bytecode program" invariant (a), (b)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Run,
    Halt,
    Dead,
}

/// One open VM cursor (§3 "Cursor").
struct VdbeCursor<C> {
    storage: C,
    #[allow(dead_code)]
    root: RootId,
    /// Cache of the most recently decoded row, so repeated `Column` reads of
    /// the same row don't re-decode the record.
    row_cache: Option<(i64, Vec<Value>)>,
}

/// A row delivered by [`Vdbe::step`] returning [`StepResult::Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Row(ResultRow),
    Done,
}

/// What happens to the enclosing transaction when the program's current
/// error is reported (§7 "Propagation"; §4.6 `reset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorAction {
    #[default]
    Abort,
    Rollback,
    Fail,
    Ignore,
}

/// A compiled, executable program. Generic over the storage backend so the
/// same machine runs against [`crate::storage::MemStorage`] in tests and
/// against any other [`Storage`] implementation in a real embedding.
pub struct Vdbe<S: Storage> {
    instructions: Vec<Instruction>,
    /// Allocates strictly negative label placeholders (§4.6 `make_label`).
    next_label: i32,
    pending_label_refs: HashMap<i32, Vec<usize>>,

    lifecycle: Lifecycle,
    pc: usize,
    registers: Vec<Value>,
    variables: Vec<Value>,
    cursors: Vec<Option<VdbeCursor<S::Cursor>>>,
    rowsets: HashMap<i32, RowSet>,
    agg: AggContext,
    explain: bool,
    pub error_action: ErrorAction,
    last_error: Option<Error>,
    /// Rows touched by `Insert`/`Delete` this run (`Database::changes`'
    /// source, mirroring the teacher's `nChange`).
    changes: i64,
    /// Key of the most recent `Insert`, or 0 before any run
    /// (`Database::last_insert_rowid`'s source, mirroring `lastRowid`).
    last_insert_rowid: i64,
}

impl<S: Storage> Vdbe<S> {
    /// §4.6 `create(db) -> program`.
    pub fn new() -> Self {
        Vdbe {
            instructions: Vec::new(),
            next_label: -1,
            pending_label_refs: HashMap::new(),
            lifecycle: Lifecycle::Init,
            pc: 0,
            registers: Vec::new(),
            variables: Vec::new(),
            cursors: Vec::new(),
            rowsets: HashMap::new(),
            agg: AggContext::default(),
            explain: false,
            error_action: ErrorAction::Abort,
            last_error: None,
            changes: 0,
            last_insert_rowid: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Rows inserted or deleted by this run of the program so far.
    pub fn changes(&self) -> i64 {
        self.changes
    }

    /// Key of the most recently inserted row this run, or 0 if none yet.
    pub fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid
    }

    fn require_init(&self) -> Result<()> {
        if self.lifecycle != Lifecycle::Init {
            return Err(Error::Misuse("opcodes may only be added while the program is in INIT".into()));
        }
        Ok(())
    }

    /// `add_op(program, opcode, p1, p2) -> address`.
    pub fn add_op(&mut self, op: Op, p1: i32, p2: i32) -> Result<usize> {
        self.require_init()?;
        self.instructions.push(Instruction::new(op, p1, p2));
        Ok(self.instructions.len() - 1)
    }

    /// Emits an opcode with a plain third operand (a register, most often).
    pub fn add_op3(&mut self, op: Op, p1: i32, p2: i32, p3: i32) -> Result<usize> {
        self.require_init()?;
        self.instructions.push(Instruction::with_p3(op, p1, p2, p3));
        Ok(self.instructions.len() - 1)
    }

    /// `op3(..., p3, p3type) -> address`: emits an opcode carrying a typed,
    /// possibly-owned payload (§4.6's "records dynamic ownership ...
    /// according to the p3type tag").
    pub fn op4(&mut self, op: Op, p1: i32, p2: i32, p3: i32, p4: P4) -> Result<usize> {
        self.require_init()?;
        self.instructions.push(Instruction::with_p4(op, p1, p2, p3, p4));
        Ok(self.instructions.len() - 1)
    }

    /// `make_label(program) -> label`, a strictly negative placeholder.
    pub fn make_label(&mut self) -> i32 {
        let label = self.next_label;
        self.next_label -= 1;
        label
    }

    /// Emits a forward branch to `label`, to be patched by
    /// [`Self::resolve_label`]. Until then the instruction's P2 holds the
    /// (negative) label itself.
    pub fn add_op_to_label(&mut self, op: Op, p1: i32, label: i32) -> Result<usize> {
        let addr = self.add_op(op, p1, label)?;
        self.pending_label_refs.entry(label).or_default().push(addr);
        Ok(addr)
    }

    /// Emits a comparison-family opcode (`Eq`/`Ne`/.../`RowSetTest`) branching
    /// to `label`, with both its plain operand (`p1`) and its second operand
    /// register (`p3`) set up front.
    pub fn add_cmp_to_label(&mut self, op: Op, p1: i32, p3: i32, label: i32) -> Result<usize> {
        self.require_init()?;
        let addr = self.instructions.len();
        self.instructions.push(Instruction::with_p3(op, p1, label, p3));
        self.pending_label_refs.entry(label).or_default().push(addr);
        Ok(addr)
    }

    /// `resolve_label(program, label)` binds it to the current address and
    /// back-patches every prior reference.
    pub fn resolve_label(&mut self, label: i32) -> Result<()> {
        self.require_init()?;
        let here = self.instructions.len() as i32;
        if let Some(refs) = self.pending_label_refs.remove(&label) {
            for addr in refs {
                self.instructions[addr].p2 = here;
            }
        }
        Ok(())
    }

    pub fn change_p1(&mut self, addr: usize, p1: i32) {
        self.instructions[addr].p1 = p1;
    }

    pub fn change_p2(&mut self, addr: usize, p2: i32) {
        self.instructions[addr].p2 = p2;
    }

    pub fn change_p3(&mut self, addr: usize, p3: i32) {
        self.instructions[addr].p3 = p3;
    }

    pub fn current_address(&self) -> usize {
        self.instructions.len()
    }

    /// `add_op_list(program, template)`: appends a static opcode list,
    /// relocating any branch targets expressed relative to the template's
    /// own start by the base offset at which it lands.
    pub fn add_op_list(&mut self, template: &[Instruction]) -> Result<usize> {
        self.require_init()?;
        let base = self.instructions.len();
        for inst in template {
            let mut inst = inst.clone();
            if is_branch(&inst.op) && inst.p2 >= 0 {
                inst.p2 += base as i32;
            }
            self.instructions.push(inst);
        }
        Ok(base)
    }

    /// `make_ready(program, n_variables, is_explain)`: INIT -> RUN.
    pub fn make_ready(&mut self, n_variables: usize, is_explain: bool) -> Result<()> {
        self.require_init()?;
        if !self.pending_label_refs.is_empty() {
            return Err(Error::Internal("unresolved label at make_ready".into()));
        }
        self.add_op(Op::Halt, 0, 0)?;
        // One slot per opcode is an upper bound on live registers, per §4.6.
        self.registers = vec![Value::Null; self.instructions.len().max(1)];
        self.variables = vec![Value::Null; n_variables];
        self.explain = is_explain;
        self.pc = 0;
        self.lifecycle = Lifecycle::Run;
        Ok(())
    }

    fn require_run_or_halt(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Run | Lifecycle::Halt => Ok(()),
            _ => Err(Error::Misuse("program is not in RUN or HALT state".into())),
        }
    }

    fn bind_check(&self, index: usize) -> Result<()> {
        if self.lifecycle != Lifecycle::Run || self.pc != 0 {
            return Err(Error::Misuse("binding is only legal in RUN state with pc == 0".into()));
        }
        if index == 0 || index > self.variables.len() {
            return Err(Error::Range);
        }
        Ok(())
    }

    pub fn bind_int(&mut self, index: usize, v: i64) -> Result<()> {
        self.bind_check(index)?;
        self.variables[index - 1] = Value::Integer(v);
        Ok(())
    }

    pub fn bind_double(&mut self, index: usize, v: f64) -> Result<()> {
        self.bind_check(index)?;
        self.variables[index - 1] = Value::Real(v);
        Ok(())
    }

    pub fn bind_text(&mut self, index: usize, v: impl AsRef<str>) -> Result<()> {
        self.bind_check(index)?;
        self.variables[index - 1] = Value::text(v);
        Ok(())
    }

    pub fn bind_blob(&mut self, index: usize, v: &[u8]) -> Result<()> {
        self.bind_check(index)?;
        self.variables[index - 1] = Value::blob(v);
        Ok(())
    }

    pub fn bind_null(&mut self, index: usize) -> Result<()> {
        self.bind_check(index)?;
        self.variables[index - 1] = Value::Null;
        Ok(())
    }

    /// §4.6 "step": in EXPLAIN mode, fabricates a 5-column row per opcode and
    /// advances one instruction; otherwise runs until a row is ready or HALT.
    pub fn step(&mut self, storage: &mut S, funcs: &FuncRegistry) -> Result<StepResult> {
        self.require_run_or_halt()?;
        if self.lifecycle == Lifecycle::Halt {
            return Ok(StepResult::Done);
        }

        if self.explain {
            return self.step_explain();
        }

        loop {
            if self.pc >= self.instructions.len() {
                self.lifecycle = Lifecycle::Halt;
                return Ok(StepResult::Done);
            }
            let inst = self.instructions[self.pc].clone();
            match self.exec(&inst, storage, funcs) {
                Ok(Some(row)) => return Ok(StepResult::Row(row)),
                Ok(None) => continue,
                Err(e) => {
                    self.last_error = Some(e.clone());
                    self.lifecycle = Lifecycle::Halt;
                    return Err(e);
                }
            }
        }
    }

    fn step_explain(&mut self) -> Result<StepResult> {
        if self.pc >= self.instructions.len() {
            self.lifecycle = Lifecycle::Halt;
            return Ok(StepResult::Done);
        }
        let inst = &self.instructions[self.pc];
        let row = ResultRow {
            values: vec![
                Value::Integer(self.pc as i64),
                Value::text(format!("{:?}", inst.op)),
                Value::Integer(inst.p1 as i64),
                Value::Integer(inst.p2 as i64),
                Value::text(render_p4(&inst.p4)),
            ],
        };
        self.pc += 1;
        Ok(StepResult::Row(row))
    }

    /// Executes one instruction. Returns `Ok(Some(row))` on a result-row
    /// opcode and leaves `pc` already advanced past it; `Ok(None)` means the
    /// caller's run loop should keep going (`pc` has been updated either by
    /// a branch or by [`Self::advance`]).
    fn exec(&mut self, inst: &Instruction, storage: &mut S, funcs: &FuncRegistry) -> Result<Option<ResultRow>> {
        use Op::*;
        match &inst.op {
            Noop => self.advance(),
            Goto => self.pc = inst.p2 as usize,
            Halt => {
                self.lifecycle = Lifecycle::Halt;
                self.pc = self.instructions.len();
                if inst.p1 != 0 {
                    return Err(Error::Generic(format!("halted with code {}", inst.p1)));
                }
            }
            Integer => {
                self.set_reg(inst.p2, Value::Integer(inst.p1 as i64));
                self.advance();
            }
            Real | String | Blob => {
                self.set_reg(inst.p2, p4_value(&inst.p4)?);
                self.advance();
            }
            Null => {
                self.set_reg(inst.p2, Value::Null);
                self.advance();
            }
            Variable => {
                let v = self.variables.get(inst.p1 as usize - 1).cloned().unwrap_or(Value::Null);
                self.set_reg(inst.p2, v);
                self.advance();
            }
            Copy => {
                let v = self.reg(inst.p1).clone();
                self.set_reg(inst.p2, v);
                self.advance();
            }
            Move => {
                let v = std::mem::replace(self.reg_mut(inst.p1), Value::Null);
                self.set_reg(inst.p2, v);
                self.advance();
            }
            OpenRead | OpenWrite => {
                let writable = matches!(inst.op, OpenWrite);
                let root = inst.p2 as RootId;
                let cursor = storage.open_cursor(root, writable)?;
                self.install_cursor(inst.p1, VdbeCursor { storage: cursor, root, row_cache: None });
                self.advance();
            }
            OpenEphemeral => {
                let root = storage.create_root()?;
                let cursor = storage.open_cursor(root, true)?;
                self.install_cursor(inst.p1, VdbeCursor { storage: cursor, root, row_cache: None });
                self.advance();
            }
            Close => {
                if let Some(slot) = self.cursors.get_mut(inst.p1 as usize) {
                    if let Some(c) = slot.take() {
                        storage.close_cursor(c.storage)?;
                    }
                }
                self.advance();
            }
            SeekGe => {
                let key = self.reg(inst.p2).as_i64().unwrap_or(0);
                let cursor = self.cursor_mut(inst.p1)?;
                let m = storage.moveto(&mut cursor.storage, key)?;
                cursor.row_cache = None;
                if m == SeekMatch::Exact {
                    self.pc = inst.p3 as usize;
                } else {
                    self.advance();
                }
            }
            NotExists => {
                let key = self.reg(inst.p2).as_i64().unwrap_or(0);
                let cursor = self.cursor_mut(inst.p1)?;
                let m = storage.moveto(&mut cursor.storage, key)?;
                cursor.row_cache = None;
                if m != SeekMatch::Exact {
                    self.pc = inst.p3 as usize;
                } else {
                    self.advance();
                }
            }
            Rewind => {
                let cursor = self.cursor_mut(inst.p1)?;
                let has_row = storage.first(&mut cursor.storage)?;
                cursor.row_cache = None;
                if has_row {
                    self.advance();
                } else {
                    self.pc = inst.p2 as usize;
                }
            }
            Next => {
                let cursor = self.cursor_mut(inst.p1)?;
                let has_row = storage.next(&mut cursor.storage)?;
                cursor.row_cache = None;
                if has_row {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            Prev => {
                let cursor = self.cursor_mut(inst.p1)?;
                let has_row = storage.prev(&mut cursor.storage)?;
                cursor.row_cache = None;
                if has_row {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            Column => {
                let col = inst.p2 as usize;
                let value = self.read_column(inst.p1, col, storage)?;
                self.set_reg(inst.p3, value);
                self.advance();
            }
            MakeRecord => {
                let start = inst.p1 as usize;
                let count = inst.p2 as usize;
                let values: Vec<Value> = self.registers[start..start + count].to_vec();
                let bytes = encode_record(&values);
                self.set_reg(inst.p3, Value::blob(&bytes));
                self.advance();
            }
            Insert => {
                let key = self.reg(inst.p2).as_i64().ok_or(Error::Mismatch)?;
                let data = match self.reg(inst.p3) {
                    Value::Blob(b) => b.as_bytes().to_vec(),
                    _ => return Err(Error::Mismatch),
                };
                let cursor = self.cursor_mut(inst.p1)?;
                storage.insert(&mut cursor.storage, key, &data)?;
                cursor.row_cache = None;
                self.changes += 1;
                self.last_insert_rowid = key;
                self.advance();
            }
            Delete => {
                let cursor = self.cursor_mut(inst.p1)?;
                storage.delete(&mut cursor.storage)?;
                cursor.row_cache = None;
                self.changes += 1;
                self.advance();
            }
            RowId => {
                let cursor = self.cursor_mut(inst.p1)?;
                let k = storage.key(&cursor.storage)?;
                self.set_reg(inst.p2, Value::Integer(k));
                self.advance();
            }
            NewRowId => {
                let cursor = self.cursor_mut(inst.p1)?;
                let has_row = storage.last(&mut cursor.storage)?;
                let next = if has_row { storage.key(&cursor.storage)? + 1 } else { 1 };
                cursor.row_cache = None;
                self.set_reg(inst.p2, Value::Integer(next));
                self.advance();
            }
            IsNull => {
                if self.reg(inst.p1).is_null() {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            NotNull => {
                if !self.reg(inst.p1).is_null() {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            Eq | Ne | Lt | Le | Gt | Ge => {
                let coll = match &inst.p4 {
                    P4::Collation(c) => Some(c),
                    _ => None,
                };
                let ord = compare_values(self.reg(inst.p1), self.reg(inst.p3), coll);
                let take = match inst.op {
                    Eq => ord.is_eq(),
                    Ne => !ord.is_eq(),
                    Lt => ord.is_lt(),
                    Le => ord.is_le(),
                    Gt => ord.is_gt(),
                    Ge => ord.is_ge(),
                    _ => unreachable!(),
                };
                if take {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            Arith(op) => {
                let lhs = self.reg(inst.p1).as_f64();
                let rhs = self.reg(inst.p2).as_f64();
                let result = match (lhs, rhs) {
                    (Some(a), Some(b)) => arith(*op, a, b),
                    _ => Value::Null,
                };
                self.set_reg(inst.p3, result);
                self.advance();
            }
            Not => {
                let v = if self.reg(inst.p1).is_null() {
                    Value::Null
                } else {
                    Value::Integer(!self.reg(inst.p1).truthy() as i64)
                };
                self.set_reg(inst.p2, v);
                self.advance();
            }
            Function => {
                let name = match &inst.p4 {
                    P4::Dynamic(s) => s.clone(),
                    _ => return Err(Error::Internal("Function opcode missing name in P4".into())),
                };
                let arity = inst.p1 as usize;
                let start = inst.p2 as usize;
                let args = self.registers[start..start + arity].to_vec();
                let def = funcs.find(&name, arity)?;
                let value = match &def.imp {
                    crate::func::FuncImpl::Scalar(f) => f(&args)?,
                    crate::func::FuncImpl::Aggregate(_) => {
                        return Err(Error::Internal("aggregate called via Function opcode".into()))
                    }
                };
                self.set_reg(inst.p3, value);
                self.advance();
            }
            AggStep => {
                let slot = inst.p1 as usize;
                let name = match &inst.p4 {
                    P4::Dynamic(s) => s.clone(),
                    _ => return Err(Error::Internal("AggStep opcode missing function name in P4".into())),
                };
                let arg = self.reg(inst.p2).clone();
                let args = if arg.is_null() && name.eq_ignore_ascii_case("count") {
                    vec![]
                } else {
                    vec![arg]
                };
                let def = funcs.find(&name, args.len())?;
                let crate::func::FuncImpl::Aggregate(agg_fn) = &def.imp else {
                    return Err(Error::Internal(format!("{name} is not an aggregate")));
                };
                while self.agg.accumulators.len() <= slot {
                    self.agg.accumulators.push(Value::Null);
                }
                if self.agg.accumulators[slot].is_null() {
                    self.agg.accumulators[slot] = agg_fn.init();
                }
                agg_fn.step(&mut self.agg.accumulators[slot], &args)?;
                self.advance();
            }
            AggFinal => {
                let slot = inst.p1 as usize;
                let name = match &inst.p4 {
                    P4::Dynamic(s) => s.clone(),
                    _ => return Err(Error::Internal("AggFinal opcode missing function name in P4".into())),
                };
                let acc = self.agg.accumulators.get(slot).cloned().unwrap_or(Value::Null);
                let def = funcs.find(&name, 1).or_else(|_| funcs.find(&name, 0))?;
                let crate::func::FuncImpl::Aggregate(agg_fn) = &def.imp else {
                    return Err(Error::Internal(format!("{name} is not an aggregate")));
                };
                let result = agg_fn.finalize(acc)?;
                self.set_reg(inst.p2, result);
                self.advance();
            }
            AggReset => {
                self.agg.accumulators.clear();
                self.advance();
            }
            RowSetAdd => {
                let v = self.reg(inst.p2).as_i64().ok_or(Error::Mismatch)?;
                self.rowsets.entry(inst.p1).or_default().insert(v);
                self.advance();
            }
            RowSetTest => {
                let v = self.reg(inst.p3).as_i64().ok_or(Error::Mismatch)?;
                let set_id = inst.p1 as u32;
                let present = self.rowsets.entry(inst.p1).or_default().test(set_id, v);
                if !present {
                    self.pc = inst.p2 as usize;
                } else {
                    self.advance();
                }
            }
            ResultRow => {
                let start = inst.p1 as usize;
                let count = inst.p2 as usize;
                let values = self.registers[start..start + count].to_vec();
                self.advance();
                return Ok(Some(ResultRow { values }));
            }
            Transaction => {
                storage.begin()?;
                self.advance();
            }
            StmtBegin => {
                storage.stmt_begin()?;
                self.advance();
            }
            StmtCommit => {
                storage.stmt_commit()?;
                self.advance();
            }
            StmtRollback => {
                storage.stmt_rollback()?;
                self.advance();
            }
            TriggerBegin | TriggerEnd | VerifyCookie => self.advance(),
        }
        Ok(None)
    }

    fn advance(&mut self) {
        self.pc += 1;
    }

    fn reg(&self, i: i32) -> &Value {
        &self.registers[i as usize]
    }

    fn reg_mut(&mut self, i: i32) -> &mut Value {
        &mut self.registers[i as usize]
    }

    fn set_reg(&mut self, i: i32, v: Value) {
        self.registers[i as usize] = v;
    }

    fn install_cursor(&mut self, i: i32, cursor: VdbeCursor<S::Cursor>) {
        let i = i as usize;
        while self.cursors.len() <= i {
            self.cursors.push(None);
        }
        self.cursors[i] = Some(cursor);
    }

    fn cursor_mut(&mut self, i: i32) -> Result<&mut VdbeCursor<S::Cursor>> {
        self.cursors
            .get_mut(i as usize)
            .and_then(|c| c.as_mut())
            .ok_or_else(|| Error::Internal(format!("cursor {i} not open")))
    }

    fn read_column(&mut self, cursor_idx: i32, col: usize, storage: &mut S) -> Result<Value> {
        let cursor = self.cursor_mut(cursor_idx)?;
        let key = storage.key(&cursor.storage)?;
        if cursor.row_cache.as_ref().map(|(k, _)| *k) != Some(key) {
            let bytes = storage.data(&cursor.storage)?.to_vec();
            let values = decode_record(&bytes)?;
            cursor.row_cache = Some((key, values));
        }
        Ok(cursor.row_cache.as_ref().unwrap().1.get(col).cloned().unwrap_or(Value::Null))
    }

    /// `reset(program) -> result-code`: per §4.6, cleans up cursors/sorters/
    /// aggregate context/memory cells, rolls back or commits per the error
    /// action, and returns to INIT.
    pub fn reset(&mut self, storage: &mut S) -> Result<()> {
        match (&self.last_error, self.error_action) {
            (Some(_), ErrorAction::Rollback) => {
                log::debug!(target: "corvid::vdbe", "reset: rolling back transaction");
                storage.rollback()?;
            }
            (Some(_), ErrorAction::Abort) => {
                log::debug!(target: "corvid::vdbe", "reset: aborting statement");
                storage.stmt_rollback()?;
            }
            (Some(_), ErrorAction::Fail) => {
                log::debug!(target: "corvid::vdbe", "reset: fail action, keeping prior changes");
            }
            (Some(_), ErrorAction::Ignore) => {
                log::debug!(target: "corvid::vdbe", "reset: ignore action, continuing");
            }
            (None, _) => {
                storage.stmt_commit()?;
            }
        }
        for slot in self.cursors.drain(..) {
            if let Some(c) = slot {
                storage.close_cursor(c.storage)?;
            }
        }
        self.rowsets.clear();
        self.agg = AggContext::default();
        self.registers.clear();
        self.pc = 0;
        self.lifecycle = Lifecycle::Init;
        self.last_error = None;
        self.changes = 0;
        Ok(())
    }

    /// `finalize(program) = reset + destroy`; returns whether the caller
    /// should reload the schema (§4.6, §7 "schema reload").
    pub fn finalize(&mut self, storage: &mut S) -> Result<bool> {
        let triggers_reload = self.last_error.as_ref().map(|e| e.triggers_schema_reload()).unwrap_or(false);
        self.reset(storage)?;
        self.lifecycle = Lifecycle::Dead;
        Ok(triggers_reload)
    }
}

impl<S: Storage> Default for Vdbe<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn is_branch(op: &Op) -> bool {
    matches!(
        op,
        Op::Goto | Op::IsNull | Op::NotNull | Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge
    )
}

fn p4_value(p4: &P4) -> Result<Value> {
    match p4 {
        P4::Value(v) => Ok(v.clone()),
        P4::Static(s) => Ok(Value::text(s.as_ref())),
        P4::Dynamic(s) => Ok(Value::text(s)),
        _ => Err(Error::Internal("opcode's P4 does not carry a value".into())),
    }
}

fn arith(op: ArithOp, a: f64, b: f64) -> Value {
    let r = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Value::Null;
            }
            a / b
        }
        ArithOp::Rem => {
            if b == 0.0 {
                return Value::Null;
            }
            a % b
        }
    };
    if r.fract() == 0.0 && r.abs() < i64::MAX as f64 {
        Value::Integer(r as i64)
    } else {
        Value::Real(r)
    }
}

fn render_p4(p4: &P4) -> String {
    match p4 {
        P4::NotUsed => String::new(),
        P4::Static(s) => s.to_string(),
        P4::Dynamic(s) => s.clone(),
        P4::Value(v) => format!("{v:?}"),
        P4::Collation(c) => format!("collseq({})", c.name),
        P4::KeyInfo(ki) => {
            let cols = ki
                .descending
                .iter()
                .zip(ki.collations.iter())
                .map(|(desc, coll)| {
                    let name = coll.as_ref().map(|c| c.name.as_str()).unwrap_or("BINARY");
                    if *desc { format!("-{name}") } else { name.to_string() }
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("keyinfo({},{})", ki.n_field(), cols)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn labels_resolve_to_current_address() {
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        let label = vm.make_label();
        vm.add_op_to_label(Op::Goto, 0, label).unwrap();
        vm.add_op(Op::Noop, 0, 0).unwrap();
        vm.resolve_label(label).unwrap();
        let target = vm.current_address();
        vm.add_op(Op::Halt, 0, 0).unwrap();
        assert_eq!(vm.instructions[0].p2, target as i32);
    }

    #[test]
    fn make_ready_appends_halt_and_transitions_to_run() {
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Noop, 0, 0).unwrap();
        vm.make_ready(0, false).unwrap();
        assert_eq!(vm.lifecycle(), Lifecycle::Run);
        assert_eq!(vm.instructions.last().unwrap().op, Op::Halt);
    }

    #[test]
    fn binding_outside_pc_zero_is_misuse() {
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Halt, 0, 0).unwrap();
        vm.make_ready(1, false).unwrap();
        vm.pc = 1;
        assert!(matches!(vm.bind_int(1, 5), Err(Error::Misuse(_))));
    }

    #[test]
    fn simple_program_produces_a_result_row() {
        let mut storage = MemStorage::new();
        let funcs = FuncRegistry::new();
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Integer, 7, 0).unwrap();
        vm.add_op(Op::ResultRow, 0, 1).unwrap();
        vm.make_ready(0, false).unwrap();
        let row = vm.step(&mut storage, &funcs).unwrap();
        assert_eq!(row, StepResult::Row(ResultRow { values: vec![Value::Integer(7)] }));
        let done = vm.step(&mut storage, &funcs).unwrap();
        assert_eq!(done, StepResult::Done);
    }

    #[test]
    fn explain_mode_fabricates_five_column_rows_without_opening_cursors() {
        let mut storage = MemStorage::new();
        let funcs = FuncRegistry::new();
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Integer, 1, 0).unwrap();
        vm.make_ready(0, true).unwrap();
        let row = vm.step(&mut storage, &funcs).unwrap();
        let StepResult::Row(r) = row else { panic!() };
        assert_eq!(r.values.len(), 5);
        assert_eq!(r.values[0], Value::Integer(0));
    }

    #[test]
    fn insert_then_column_round_trips_through_storage() {
        let mut storage = MemStorage::new();
        let root = storage.create_root().unwrap();
        let funcs = FuncRegistry::new();
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::OpenWrite, 0, root as i32).unwrap();
        vm.add_op(Op::Integer, 42, 1).unwrap();
        vm.add_op(Op::Integer, 99, 2).unwrap();
        vm.add_op3(Op::MakeRecord, 2, 1, 3).unwrap();
        // Insert reads its key from p2 (reg 1) and its record from the
        // register MakeRecord just wrote (reg 3), carried in p3.
        vm.add_op3(Op::Insert, 0, 1, 3).unwrap();
        vm.add_op3(Op::Column, 0, 0, 4).unwrap();
        vm.add_op(Op::ResultRow, 4, 1).unwrap();
        vm.make_ready(0, false).unwrap();

        let row = vm.step(&mut storage, &funcs).unwrap();
        assert_eq!(row, StepResult::Row(ResultRow { values: vec![Value::Integer(99)] }));
    }

    #[test]
    fn aggregate_step_and_final_matches_sum() {
        let mut storage = MemStorage::new();
        let funcs = FuncRegistry::new();
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Integer, 3, 1).unwrap();
        vm.op4(Op::AggStep, 0, 1, 0, P4::Dynamic("sum".into())).unwrap();
        vm.add_op(Op::Integer, 4, 1).unwrap();
        vm.op4(Op::AggStep, 0, 1, 0, P4::Dynamic("sum".into())).unwrap();
        vm.op4(Op::AggFinal, 0, 2, 0, P4::Dynamic("sum".into())).unwrap();
        vm.add_op(Op::ResultRow, 2, 1).unwrap();
        vm.make_ready(0, false).unwrap();

        let row = vm.step(&mut storage, &funcs).unwrap();
        assert_eq!(row, StepResult::Row(ResultRow { values: vec![Value::Real(7.0)] }));
    }

    #[test]
    fn rowset_test_reflects_prior_inserts() {
        let mut storage = MemStorage::new();
        let funcs = FuncRegistry::new();
        let mut vm: Vdbe<MemStorage> = Vdbe::new();
        vm.add_op(Op::Integer, 5, 1).unwrap();
        vm.add_op(Op::RowSetAdd, 0, 1).unwrap();
        vm.add_op(Op::Integer, 5, 2).unwrap();
        let miss_label = vm.make_label();
        vm.add_op_to_label(Op::RowSetTest, 0, miss_label).unwrap();
        vm.instructions[3].p3 = 2;
        vm.add_op(Op::Integer, 1, 3).unwrap();
        let end = vm.make_label();
        vm.add_op_to_label(Op::Goto, 0, end).unwrap();
        vm.resolve_label(miss_label).unwrap();
        vm.add_op(Op::Integer, 0, 3).unwrap();
        vm.resolve_label(end).unwrap();
        vm.add_op(Op::ResultRow, 3, 1).unwrap();
        vm.make_ready(0, false).unwrap();

        let row = vm.step(&mut storage, &funcs).unwrap();
        assert_eq!(row, StepResult::Row(ResultRow { values: vec![Value::Integer(1)] }));
    }
}
