//! Fluent construction of `Module`s
//!
//! Hands out module-unique value, site and call-site ids so that callers
//! (tests, front ends, the CLI fixtures) never have to number things by hand.

use super::program::{
    AllocKind, AllocSiteId, CallSite, CallSiteId, CallTarget, Formal, Function, FunctionId,
    Global, GlobalId, Module, Operation, ValueId,
};

/// Builder for `Module`
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
    next_value: u32,
    next_site: u32,
}

impl ModuleBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module {
                name: name.into(),
                ..Module::default()
            },
            ..Self::default()
        }
    }

    /// Allocate a fresh value id
    pub fn value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn site(&mut self) -> AllocSiteId {
        let id = AllocSiteId(self.next_site);
        self.next_site += 1;
        id
    }

    /// Add a global variable
    pub fn global(&mut self, name: impl Into<String>, size: u32) -> GlobalId {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global {
            id,
            name: name.into(),
            size,
        });
        id
    }

    /// Add a function definition; `formals[i]` tells whether formal `i` is a pointer
    pub fn function(
        &mut self,
        name: impl Into<String>,
        formals: &[bool],
        returns_pointer: bool,
    ) -> (FunctionId, Vec<ValueId>) {
        self.add_function(name.into(), formals, returns_pointer, false)
    }

    /// Add an external declaration
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        formals: &[bool],
        returns_pointer: bool,
    ) -> FunctionId {
        self.add_function(name.into(), formals, returns_pointer, true).0
    }

    fn add_function(
        &mut self,
        name: String,
        formals: &[bool],
        returns_pointer: bool,
        is_declaration: bool,
    ) -> (FunctionId, Vec<ValueId>) {
        let id = FunctionId(self.module.functions.len() as u32);
        let values: Vec<ValueId> = formals.iter().map(|_| self.value()).collect();
        self.module.functions.push(Function {
            id,
            name,
            formals: values
                .iter()
                .zip(formals)
                .map(|(&value, &is_pointer)| Formal { value, is_pointer })
                .collect(),
            returns_pointer,
            is_declaration,
            is_variadic: false,
            body: Vec::new(),
        });
        (id, values)
    }

    /// Mark a function as variadic
    pub fn variadic(&mut self, f: FunctionId) {
        if let Some(func) = self.function_mut(f) {
            func.is_variadic = true;
        }
    }

    fn function_mut(&mut self, f: FunctionId) -> Option<&mut Function> {
        self.module.functions.iter_mut().find(|func| func.id == f)
    }

    /// Append a raw operation to a function body
    pub fn op(&mut self, f: FunctionId, op: Operation) {
        if let Some(func) = self.function_mut(f) {
            func.body.push(op);
        }
    }

    /// `v = alloc(size)` with a fresh allocation site
    pub fn alloc(&mut self, f: FunctionId, kind: AllocKind, size: u32) -> ValueId {
        let dst = self.value();
        let site = self.site();
        self.op(
            f,
            Operation::Alloc {
                dst,
                site,
                kind,
                size,
                ty: None,
            },
        );
        dst
    }

    /// `v = src`
    pub fn copy(&mut self, f: FunctionId, src: ValueId) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::Copy { dst, src });
        dst
    }

    /// `v = &base->field@offset`
    pub fn field_addr(&mut self, f: FunctionId, base: ValueId, offset: u32) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::FieldAddr { dst, base, offset });
        dst
    }

    /// `v = &base[i]`
    pub fn index_addr(&mut self, f: FunctionId, base: ValueId, stride: u32) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::IndexAddr { dst, base, stride });
        dst
    }

    /// `v = *addr`
    pub fn load(&mut self, f: FunctionId, addr: ValueId) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::Load { dst, addr, ty: None });
        dst
    }

    /// `*addr = value`
    pub fn store(&mut self, f: FunctionId, addr: ValueId, value: Option<ValueId>) {
        self.op(
            f,
            Operation::Store {
                addr,
                value,
                ty: None,
            },
        );
    }

    /// `v = &global`
    pub fn global_addr(&mut self, f: FunctionId, global: GlobalId) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::GlobalAddr { dst, global });
        dst
    }

    /// `return value`
    pub fn ret(&mut self, f: FunctionId, value: ValueId) {
        self.op(f, Operation::Return { value });
    }

    /// `v = (ptr) n`
    pub fn int_to_ptr(&mut self, f: FunctionId) -> ValueId {
        let dst = self.value();
        self.op(f, Operation::IntToPtr { dst });
        dst
    }

    fn add_call(
        &mut self,
        caller: FunctionId,
        target: CallTarget,
        actuals: &[Option<ValueId>],
        result: Option<ValueId>,
    ) -> CallSiteId {
        let id = CallSiteId(self.module.call_sites.len() as u32);
        self.module.call_sites.push(CallSite {
            id,
            caller,
            target,
            actuals: actuals.to_vec(),
            result,
        });
        id
    }

    /// Direct call without a pointer result
    pub fn call(
        &mut self,
        caller: FunctionId,
        callee: FunctionId,
        actuals: &[Option<ValueId>],
    ) -> CallSiteId {
        self.add_call(caller, CallTarget::Direct { callee }, actuals, None)
    }

    /// Direct call whose pointer result lands in a fresh value
    pub fn call_ret(
        &mut self,
        caller: FunctionId,
        callee: FunctionId,
        actuals: &[Option<ValueId>],
    ) -> (CallSiteId, ValueId) {
        let result = self.value();
        let cs = self.add_call(caller, CallTarget::Direct { callee }, actuals, Some(result));
        (cs, result)
    }

    /// Indirect call through a function pointer
    pub fn call_indirect(
        &mut self,
        caller: FunctionId,
        candidates: &[FunctionId],
        complete: bool,
        actuals: &[Option<ValueId>],
    ) -> CallSiteId {
        self.add_call(
            caller,
            CallTarget::Indirect {
                candidates: candidates.to_vec(),
                complete,
            },
            actuals,
            None,
        )
    }

    /// Inline assembly statement taking pointer operands
    pub fn inline_asm(&mut self, caller: FunctionId, actuals: &[Option<ValueId>]) -> CallSiteId {
        self.add_call(caller, CallTarget::InlineAsm, actuals, None)
    }

    /// Finish building
    pub fn build(self) -> Module {
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_module_unique() {
        let mut b = ModuleBuilder::new("m");
        let (f, f_formals) = b.function("f", &[true, false], false);
        let (g, g_formals) = b.function("g", &[true], true);
        let p = b.alloc(g, AllocKind::Heap, 8);
        b.ret(g, p);
        let (cs, r) = b.call_ret(f, g, &[Some(f_formals[0])]);
        let module = b.build();

        let mut values = f_formals.clone();
        values.extend(g_formals);
        values.push(p);
        values.push(r);
        let mut dedup = values.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), values.len());

        assert_eq!(module.function(g).unwrap().body.len(), 2);
        assert_eq!(module.call_site(cs).unwrap().result, Some(r));
        assert!(!module.function(f).unwrap().formals[1].is_pointer);
    }
}
