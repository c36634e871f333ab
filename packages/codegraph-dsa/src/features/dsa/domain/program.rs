//! Program model consumed by the analysis
//!
//! A deliberately small, language-agnostic view of a module: functions with
//! pointer-typed formals, globals, call sites and a per-function list of
//! memory-relevant operations. Ids are dense and module-unique; the
//! `ModuleBuilder` hands them out.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Function identifier
    FunctionId,
    "fn#"
);
define_id!(
    /// Program value identifier (scalars and formals)
    ValueId,
    "%"
);
define_id!(
    /// Global variable identifier
    GlobalId,
    "@"
);
define_id!(
    /// Call site identifier
    CallSiteId,
    "cs#"
);
define_id!(
    /// Allocation site identifier
    AllocSiteId,
    "site#"
);

/// Storage class of an allocation site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocKind {
    /// Function-local stack slot
    Stack,
    /// Heap allocation (malloc-like call)
    Heap,
    /// Global variable storage
    Global,
    /// Memory produced by code outside the module
    External,
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formal {
    pub value: ValueId,
    pub is_pointer: bool,
}

/// Memory-relevant operation inside a function body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// `dst = alloc(size)` at `site`
    Alloc {
        dst: ValueId,
        site: AllocSiteId,
        kind: AllocKind,
        size: u32,
        #[serde(default)]
        ty: Option<String>,
    },
    /// `dst = src`
    Copy { dst: ValueId, src: ValueId },
    /// `dst = &base->field` where the field starts at `offset`
    FieldAddr {
        dst: ValueId,
        base: ValueId,
        offset: u32,
    },
    /// `dst = &base[i]` for an element type of `stride` bytes
    IndexAddr {
        dst: ValueId,
        base: ValueId,
        stride: u32,
    },
    /// `dst = *addr` (pointer-typed load)
    Load {
        dst: ValueId,
        addr: ValueId,
        #[serde(default)]
        ty: Option<String>,
    },
    /// `*addr = value`; `value` is `None` for non-pointer stores
    Store {
        addr: ValueId,
        #[serde(default)]
        value: Option<ValueId>,
        #[serde(default)]
        ty: Option<String>,
    },
    /// `dst = &global`
    GlobalAddr { dst: ValueId, global: GlobalId },
    /// `return value`
    Return { value: ValueId },
    /// `dst = (ptr) integer`
    IntToPtr { dst: ValueId },
    /// `integer = (int) src`
    PtrToInt { src: ValueId },
}

/// Function definition or declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    #[serde(default)]
    pub formals: Vec<Formal>,
    #[serde(default)]
    pub returns_pointer: bool,
    #[serde(default)]
    pub is_declaration: bool,
    #[serde(default)]
    pub is_variadic: bool,
    #[serde(default)]
    pub body: Vec<Operation>,
}

impl Function {
    /// Whether the analysis can see a body for this function
    #[inline]
    pub fn has_body(&self) -> bool {
        !self.is_declaration
    }
}

/// Global variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    #[serde(default)]
    pub size: u32,
}

/// Callee designation of a call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallTarget {
    /// Statically known callee
    Direct { callee: FunctionId },
    /// Function-pointer call; `complete` when `candidates` is exhaustive
    Indirect {
        candidates: Vec<FunctionId>,
        complete: bool,
    },
    /// Inline assembly, never resolved
    InlineAsm,
}

/// Call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub id: CallSiteId,
    pub caller: FunctionId,
    pub target: CallTarget,
    /// Positional actuals; `None` for non-pointer arguments
    #[serde(default)]
    pub actuals: Vec<Option<ValueId>>,
    /// Pointer-typed result value, if any
    #[serde(default)]
    pub result: Option<ValueId>,
}

impl CallSite {
    /// Candidate callees, in declaration order
    pub fn callees(&self) -> &[FunctionId] {
        match &self.target {
            CallTarget::Direct { callee } => std::slice::from_ref(callee),
            CallTarget::Indirect { candidates, .. } => candidates,
            CallTarget::InlineAsm => &[],
        }
    }

    /// Whether `callees()` is the full set of possible targets
    pub fn is_fully_resolved(&self) -> bool {
        match &self.target {
            CallTarget::Direct { .. } => true,
            CallTarget::Indirect { complete, .. } => *complete,
            CallTarget::InlineAsm => false,
        }
    }
}

/// Whole-program unit of analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub call_sites: Vec<CallSite>,
}

impl Module {
    /// Look up a function by id
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Look up a function by name
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up a call site by id
    pub fn call_site(&self, id: CallSiteId) -> Option<&CallSite> {
        self.call_sites.iter().find(|cs| cs.id == id)
    }

    /// Look up a global by id
    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.iter().find(|g| g.id == id)
    }

    /// Function name, or a placeholder for unknown ids
    pub fn function_name(&self, id: FunctionId) -> &str {
        self.function(id).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }

    /// Index of functions by id, for hot lookups
    pub fn function_index(&self) -> FxHashMap<FunctionId, &Function> {
        self.functions.iter().map(|f| (f.id, f)).collect()
    }

    /// Call sites ordered by (caller name, first callee name, id)
    ///
    /// Every pass iterates call sites in this order so that results do not
    /// depend on container iteration order.
    pub fn sorted_call_sites(&self) -> Vec<&CallSite> {
        let names: FxHashMap<FunctionId, &str> = self
            .functions
            .iter()
            .map(|f| (f.id, f.name.as_str()))
            .collect();
        let mut sites: Vec<&CallSite> = self.call_sites.iter().collect();
        sites.sort_by_cached_key(|cs| {
            let caller = names.get(&cs.caller).copied().unwrap_or("").to_string();
            let callee = cs
                .callees()
                .first()
                .and_then(|c| names.get(c))
                .copied()
                .unwrap_or("")
                .to_string();
            (caller, callee, cs.id)
        });
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(FunctionId(3).to_string(), "fn#3");
        assert_eq!(CallSiteId(7).to_string(), "cs#7");
        assert_eq!(ValueId(1).to_string(), "%1");
    }

    #[test]
    fn test_call_target_resolution() {
        let direct = CallSite {
            id: CallSiteId(0),
            caller: FunctionId(0),
            target: CallTarget::Direct {
                callee: FunctionId(1),
            },
            actuals: vec![],
            result: None,
        };
        assert_eq!(direct.callees(), &[FunctionId(1)]);
        assert!(direct.is_fully_resolved());

        let asm = CallSite {
            target: CallTarget::InlineAsm,
            ..direct.clone()
        };
        assert!(asm.callees().is_empty());
        assert!(!asm.is_fully_resolved());
    }

    #[test]
    fn test_operation_json_shape() {
        let op = Operation::Store {
            addr: ValueId(1),
            value: Some(ValueId(2)),
            ty: None,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"store\""));
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
