//! Scenario modules
//!
//! Each builder returns the module together with the ids a test needs to
//! look at afterwards.

use codegraph_dsa::features::dsa::domain::{
    AllocKind, AllocSiteId, FunctionId, GlobalId, Module, ModuleBuilder, Operation, ValueId,
};

/// `init(p, q)` stores a fresh heap object through each formal
pub struct InitModule {
    pub module: Module,
    pub init: FunctionId,
    pub main: FunctionId,
    pub p: ValueId,
    pub q: ValueId,
}

fn init_fn(b: &mut ModuleBuilder) -> (FunctionId, ValueId, ValueId) {
    let (init, formals) = b.function("init", &[true, true], false);
    let (p, q) = (formals[0], formals[1]);
    let h1 = b.alloc(init, AllocKind::Heap, 8);
    b.store(init, p, Some(h1));
    let h2 = b.alloc(init, AllocKind::Heap, 8);
    b.store(init, q, Some(h2));
    (init, p, q)
}

/// Two fields of one stack struct reach `init` through different formals
/// at two call sites: `init(&s.a, x)` and `init(y, &s.b)`
pub struct StructFields {
    pub base: InitModule,
    pub s: ValueId,
    /// `&s.b`
    pub addr_b: ValueId,
    pub field_a: ValueId,
    pub field_b: ValueId,
}

pub fn struct_fields() -> StructFields {
    let mut b = ModuleBuilder::new("struct_fields");
    let (init, p, q) = init_fn(&mut b);
    let (main, _) = b.function("main", &[], false);
    let s = b.alloc(main, AllocKind::Stack, 16);
    let addr_b = b.field_addr(main, s, 8);
    let x = b.alloc(main, AllocKind::Stack, 8);
    let y = b.alloc(main, AllocKind::Stack, 8);
    b.call(main, init, &[Some(s), Some(x)]);
    b.call(main, init, &[Some(y), Some(addr_b)]);
    let field_a = b.load(main, s);
    let field_b = b.load(main, addr_b);
    StructFields {
        base: InitModule {
            module: b.build(),
            init,
            main,
            p,
            q,
        },
        s,
        addr_b,
        field_a,
        field_b,
    }
}

/// `init(a, a)` followed by `init(b, c)` from `main`
pub struct AliasedCalls {
    pub base: InitModule,
    pub a: ValueId,
    pub b: ValueId,
    pub c: ValueId,
}

pub fn aliased_calls() -> AliasedCalls {
    let mut mb = ModuleBuilder::new("aliased_calls");
    let (init, p, q) = init_fn(&mut mb);
    let (main, _) = mb.function("main", &[], false);
    let a = mb.alloc(main, AllocKind::Stack, 8);
    let b = mb.alloc(main, AllocKind::Stack, 8);
    let c = mb.alloc(main, AllocKind::Stack, 8);
    mb.call(main, init, &[Some(a), Some(a)]);
    mb.call(main, init, &[Some(b), Some(c)]);
    AliasedCalls {
        base: InitModule {
            module: mb.build(),
            init,
            main,
            p,
            q,
        },
        a,
        b,
        c,
    }
}

/// Only the `init(b, c)` call of `aliased_calls`
pub fn distinct_calls() -> AliasedCalls {
    let mut mb = ModuleBuilder::new("distinct_calls");
    let (init, p, q) = init_fn(&mut mb);
    let (main, _) = mb.function("main", &[], false);
    let a = mb.alloc(main, AllocKind::Stack, 8);
    let b = mb.alloc(main, AllocKind::Stack, 8);
    let c = mb.alloc(main, AllocKind::Stack, 8);
    mb.call(main, init, &[Some(b), Some(c)]);
    AliasedCalls {
        base: InitModule {
            module: mb.build(),
            init,
            main,
            p,
            q,
        },
        a,
        b,
        c,
    }
}

/// `mk()` returns a fresh heap object; `main` calls it twice and then
/// writes different fields of the two results: `x->a = u`, `y->b = v`
pub struct TwoAllocations {
    pub module: Module,
    pub mk: FunctionId,
    pub main: FunctionId,
    pub x: ValueId,
    pub y: ValueId,
    /// Stored into `x` at offset 0
    pub u: ValueId,
    /// Stored into `y` at offset 8
    pub v: ValueId,
}

pub fn two_allocations() -> TwoAllocations {
    let mut b = ModuleBuilder::new("two_allocations");
    let (mk, _) = b.function("mk", &[], true);
    let obj = b.alloc(mk, AllocKind::Heap, 16);
    b.ret(mk, obj);
    let (main, _) = b.function("main", &[], false);
    let (_, x) = b.call_ret(main, mk, &[]);
    let (_, y) = b.call_ret(main, mk, &[]);
    let u = b.alloc(main, AllocKind::Heap, 8);
    let v = b.alloc(main, AllocKind::Heap, 8);
    b.store(main, x, Some(u));
    let y_b = b.field_addr(main, y, 8);
    b.store(main, y_b, Some(v));
    TwoAllocations {
        module: b.build(),
        mk,
        main,
        x,
        y,
        u,
        v,
    }
}

/// `join(p, q)` stores both formals into global `G`, so they share one
/// cell; `main` calls `join(&s.b, &s)`
pub struct OffsetAliasing {
    pub module: Module,
    pub main: FunctionId,
    pub s: ValueId,
}

pub fn offset_aliasing() -> OffsetAliasing {
    let mut b = ModuleBuilder::new("offset_aliasing");
    let global = b.global("G", 8);
    let (join, formals) = b.function("join", &[true, true], false);
    let g = b.global_addr(join, global);
    b.store(join, g, Some(formals[0]));
    b.store(join, g, Some(formals[1]));

    let (main, _) = b.function("main", &[], false);
    let s = b.alloc(main, AllocKind::Stack, 16);
    let addr_b = b.field_addr(main, s, 8);
    b.call(main, join, &[Some(addr_b), Some(s)]);
    OffsetAliasing {
        module: b.build(),
        main,
        s,
    }
}

/// `even(p)` and `odd(p)` walk a list and call each other
pub struct MutualRecursion {
    pub module: Module,
    pub even: FunctionId,
    pub odd: FunctionId,
    pub main: FunctionId,
    pub list: ValueId,
}

pub fn mutual_recursion() -> MutualRecursion {
    let mut b = ModuleBuilder::new("mutual_recursion");
    let (even, ef) = b.function("even", &[true], false);
    let (odd, of) = b.function("odd", &[true], false);

    let next = b.field_addr(even, ef[0], 8);
    let n = b.load(even, next);
    b.call(even, odd, &[Some(n)]);

    let next = b.field_addr(odd, of[0], 8);
    let n = b.load(odd, next);
    b.call(odd, even, &[Some(n)]);

    let (main, _) = b.function("main", &[], false);
    let list = b.alloc(main, AllocKind::Heap, 16);
    b.call(main, even, &[Some(list)]);
    MutualRecursion {
        module: b.build(),
        even,
        odd,
        main,
        list,
    }
}

/// Calls `main` cannot see into
pub struct ExternalCalls {
    pub module: Module,
    pub main: FunctionId,
    /// Passed to a declaration
    pub declared: ValueId,
    /// Passed through an incomplete indirect call
    pub indirect: ValueId,
    /// Operand of inline assembly
    pub asm: ValueId,
    /// Passed to a defined function only
    pub internal: ValueId,
}

pub fn external_calls() -> ExternalCalls {
    let mut b = ModuleBuilder::new("external_calls");
    let ext = b.declare("ext", &[true], false);
    let (sink, _) = b.function("sink", &[true], false);

    let (main, _) = b.function("main", &[], false);
    let declared = b.alloc(main, AllocKind::Heap, 8);
    let indirect = b.alloc(main, AllocKind::Heap, 8);
    let asm = b.alloc(main, AllocKind::Stack, 8);
    let internal = b.alloc(main, AllocKind::Heap, 8);
    b.call(main, ext, &[Some(declared)]);
    b.call_indirect(main, &[sink], false, &[Some(indirect)]);
    b.inline_asm(main, &[Some(asm)]);
    b.call(main, sink, &[Some(internal)]);
    ExternalCalls {
        module: b.build(),
        main,
        declared,
        indirect,
        asm,
        internal,
    }
}

/// `set()` stores a heap object into global `G`; `main` reads `G` back
pub struct GlobalStore {
    pub module: Module,
    pub set: FunctionId,
    pub main: FunctionId,
    pub global: GlobalId,
    pub site: AllocSiteId,
    pub loaded: ValueId,
}

pub fn global_store() -> GlobalStore {
    let mut b = ModuleBuilder::new("global_store");
    let global = b.global("G", 8);
    let (set, _) = b.function("set", &[], false);
    let g = b.global_addr(set, global);
    let obj = b.alloc(set, AllocKind::Heap, 8);
    b.store(set, g, Some(obj));

    let (main, _) = b.function("main", &[], false);
    let g = b.global_addr(main, global);
    b.call(main, set, &[]);
    let loaded = b.load(main, g);
    let module = b.build();

    let site = module
        .function(set)
        .and_then(|f| {
            f.body.iter().find_map(|op| match op {
                Operation::Alloc { site, .. } => Some(*site),
                _ => None,
            })
        })
        .expect("set allocates");
    GlobalStore {
        module,
        set,
        main,
        global,
        site,
        loaded,
    }
}

/// `local()` returns the address of its own stack object
pub fn escaping_stack() -> (Module, FunctionId, ValueId) {
    let mut b = ModuleBuilder::new("escaping_stack");
    let (local, _) = b.function("local", &[], true);
    let slot = b.alloc(local, AllocKind::Stack, 8);
    b.ret(local, slot);
    let (main, _) = b.function("main", &[], false);
    let (_, r) = b.call_ret(main, local, &[]);
    (b.build(), main, r)
}
