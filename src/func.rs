//! SQL function registry (§6 "SQL function registry").
//!
//! Grounded on `camdencheek-sqlite_rs/src/func.rs`. The teacher stores a
//! `FuncDef` chain per name to support overloads by arity and resolves it
//! through a raw-pointer `FuncDefHash`; here overload resolution is a `Vec`
//! search over `(name, arity)` with `-1` meaning "matches any arity", kept
//! in an `IndexMap` so registration order (and therefore lookup order for
//! ties) is stable and inspectable.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::mem::Value;

/// A scalar function implementation: called once per call site with the
/// evaluated argument values.
pub type ScalarFn = dyn Fn(&[Value]) -> Result<Value>;

/// An aggregate function implementation: `step` runs once per row, `finalize`
/// runs once at group break and produces the result (§6: "aggregates
/// receive xStep per row and xFinalize once at group break").
pub trait AggregateFn {
    fn step(&self, acc: &mut Value, args: &[Value]) -> Result<()>;
    fn finalize(&self, acc: Value) -> Result<Value>;
    fn init(&self) -> Value {
        Value::Null
    }
}

pub enum FuncImpl {
    Scalar(Rc<ScalarFn>),
    Aggregate(Rc<dyn AggregateFn>),
}

pub struct FuncDef {
    pub name: String,
    /// `-1` matches any arity, per §6.
    pub arity: i32,
    pub imp: FuncImpl,
}

impl FuncDef {
    fn matches_arity(&self, n: usize) -> bool {
        self.arity < 0 || self.arity as usize == n
    }
}

/// `name -> overload chain`, mirroring the teacher's `FuncDefHash` (name +
/// arity → implementation, chained for overloads, §3 "Database handle").
#[derive(Default)]
pub struct FuncRegistry {
    funcs: IndexMap<String, Vec<FuncDef>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        let mut reg = FuncRegistry::default();
        reg.register_builtins();
        reg
    }

    pub fn create_function(&mut self, name: impl Into<String>, arity: i32, imp: FuncImpl) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.funcs.entry(key).or_default().push(FuncDef { name, arity, imp });
    }

    pub fn find(&self, name: &str, arity: usize) -> Result<&FuncDef> {
        let key = name.to_ascii_lowercase();
        self.funcs
            .get(&key)
            .and_then(|chain| chain.iter().find(|f| f.matches_arity(arity)))
            .ok_or_else(|| Error::NoSuchFunction(name.to_string(), arity as i32))
    }

    fn register_builtins(&mut self) {
        self.create_function(
            "abs",
            1,
            FuncImpl::Scalar(Rc::new(|args| {
                Ok(match &args[0] {
                    Value::Integer(i) => Value::Integer(i.abs()),
                    Value::Real(r) => Value::Real(r.abs()),
                    Value::Null => Value::Null,
                    other => other.clone(),
                })
            })),
        );
        self.create_function(
            "upper",
            1,
            FuncImpl::Scalar(Rc::new(|args| {
                Ok(match &args[0] {
                    Value::Text(s) => Value::text(s.to_uppercase()),
                    other => other.clone(),
                })
            })),
        );
        self.create_function(
            "lower",
            1,
            FuncImpl::Scalar(Rc::new(|args| {
                Ok(match &args[0] {
                    Value::Text(s) => Value::text(s.to_lowercase()),
                    other => other.clone(),
                })
            })),
        );
        self.create_function("count", 0, FuncImpl::Aggregate(Rc::new(Count)));
        self.create_function("count", 1, FuncImpl::Aggregate(Rc::new(Count)));
        self.create_function("sum", 1, FuncImpl::Aggregate(Rc::new(Sum)));
        self.create_function("min", 1, FuncImpl::Aggregate(Rc::new(MinMax { want_min: true })));
        self.create_function("max", 1, FuncImpl::Aggregate(Rc::new(MinMax { want_min: false })));
    }
}

struct Count;
impl AggregateFn for Count {
    fn init(&self) -> Value {
        Value::Integer(0)
    }
    fn step(&self, acc: &mut Value, args: &[Value]) -> Result<()> {
        if args.is_empty() || !args[0].is_null() {
            if let Value::Integer(n) = acc {
                *n += 1;
            }
        }
        Ok(())
    }
    fn finalize(&self, acc: Value) -> Result<Value> {
        Ok(acc)
    }
}

struct Sum;
impl AggregateFn for Sum {
    fn init(&self) -> Value {
        Value::Null
    }
    fn step(&self, acc: &mut Value, args: &[Value]) -> Result<()> {
        let Some(v) = args[0].as_f64() else { return Ok(()) };
        *acc = match acc {
            Value::Null => Value::Real(v),
            Value::Real(r) => Value::Real(*r + v),
            _ => Value::Real(v),
        };
        Ok(())
    }
    fn finalize(&self, acc: Value) -> Result<Value> {
        Ok(acc)
    }
}

struct MinMax {
    want_min: bool,
}
impl AggregateFn for MinMax {
    fn step(&self, acc: &mut Value, args: &[Value]) -> Result<()> {
        let v = &args[0];
        if v.is_null() {
            return Ok(());
        }
        let better = match acc {
            Value::Null => true,
            _ => {
                let ord = crate::record::compare_values(v, acc, None);
                if self.want_min {
                    ord == std::cmp::Ordering::Less
                } else {
                    ord == std::cmp::Ordering::Greater
                }
            }
        };
        if better {
            *acc = v.clone();
        }
        Ok(())
    }
    fn finalize(&self, acc: Value) -> Result<Value> {
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_resolution_picks_matching_arity() {
        let reg = FuncRegistry::new();
        assert!(reg.find("count", 0).is_ok());
        assert!(reg.find("count", 1).is_ok());
        assert!(reg.find("count", 2).is_err());
    }

    #[test]
    fn sum_aggregate_accumulates() {
        let reg = FuncRegistry::new();
        let f = reg.find("sum", 1).unwrap();
        let FuncImpl::Aggregate(agg) = &f.imp else { panic!() };
        let mut acc = agg.init();
        agg.step(&mut acc, &[Value::Integer(3)]).unwrap();
        agg.step(&mut acc, &[Value::Integer(4)]).unwrap();
        assert_eq!(agg.finalize(acc).unwrap(), Value::Real(7.0));
    }
}
