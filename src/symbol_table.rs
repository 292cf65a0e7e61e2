use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

impl Symbol {
    pub fn new(name: &str, scope: SymbolScope, index: usize) -> Self {
        Self {
            name: name.to_string(),
            scope,
            index,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    outer: Option<usize>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
}

/// Scopes live in an arena. The root scope sits at index 0 and is never
/// removed; every nested scope links to its parent by index.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            current: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        self.current == 0
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope {
            outer: Some(self.current),
            ..Scope::default()
        });
        self.current = self.scopes.len() - 1;
    }

    /// Drops the current scope and returns its local count and the symbols it
    /// captured, in capture order. Returns `None` at the root.
    pub fn leave_scope(&mut self) -> Option<(usize, Vec<Symbol>)> {
        let outer = self.scopes[self.current].outer?;
        let scope = self.scopes.pop()?;
        self.current = outer;
        Some((scope.num_definitions, scope.free_symbols))
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let kind = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let scope = &mut self.scopes[self.current];
        let symbol = Symbol::new(name, kind, scope.num_definitions);
        scope.num_definitions += 1;
        scope.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Builtin, index);
        self.scopes[0].store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Function, 0);
        self.scopes[self.current]
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_in(self.current, name)
    }

    fn resolve_in(&mut self, scope: usize, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.scopes[scope].store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.scopes[scope].outer?;
        let symbol = self.resolve_in(outer, name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(scope, symbol)),
        }
    }

    fn define_free(&mut self, scope: usize, original: Symbol) -> Symbol {
        let scope = &mut self.scopes[scope];
        let symbol = Symbol::new(&original.name, SymbolScope::Free, scope.free_symbols.len());
        scope.free_symbols.push(original);
        scope.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Looks up a binding that an assignment may overwrite: a local of the
    /// current scope or a global. Never records captures.
    pub fn resolve_assignable(&self, name: &str) -> Option<Symbol> {
        let local = self.scopes[self.current]
            .store
            .get(name)
            .filter(|symbol| matches!(symbol.scope, SymbolScope::Local | SymbolScope::Global));
        let global = || {
            self.scopes[0]
                .store
                .get(name)
                .filter(|symbol| symbol.scope == SymbolScope::Global)
        };
        local.or_else(global).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn test_define() {
        let mut table = SymbolTable::new();
        assert_eq!(table.define("a"), Symbol::new("a", SymbolScope::Global, 0));
        assert_eq!(table.define("b"), Symbol::new("b", SymbolScope::Global, 1));

        table.enter_scope();
        assert_eq!(table.define("c"), Symbol::new("c", SymbolScope::Local, 0));
        assert_eq!(table.define("d"), Symbol::new("d", SymbolScope::Local, 1));

        table.enter_scope();
        assert_eq!(table.define("e"), Symbol::new("e", SymbolScope::Local, 0));
    }

    #[test]
    fn test_resolve_nested_locals() -> Result<()> {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");
        table.enter_scope();
        table.define("c");
        table.define("d");
        table.enter_scope();
        table.define("e");
        table.define("f");

        let expected = [
            Symbol::new("a", SymbolScope::Global, 0),
            Symbol::new("b", SymbolScope::Global, 1),
            Symbol::new("c", SymbolScope::Free, 0),
            Symbol::new("d", SymbolScope::Free, 1),
            Symbol::new("e", SymbolScope::Local, 0),
            Symbol::new("f", SymbolScope::Local, 1),
        ];
        for symbol in expected.iter() {
            let resolved = table
                .resolve(&symbol.name)
                .context(format!("{} should resolve", symbol.name))?;
            assert_eq!(&resolved, symbol);
        }

        let (num_definitions, free) = table.leave_scope().context("nested scope")?;
        assert_eq!(num_definitions, 2);
        assert_eq!(
            free,
            vec![
                Symbol::new("c", SymbolScope::Local, 0),
                Symbol::new("d", SymbolScope::Local, 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_free_variables_chain_through_intermediate_scopes() -> Result<()> {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define("x");
        table.enter_scope();
        table.enter_scope();

        let resolved = table.resolve("x").context("x")?;
        assert_eq!(resolved, Symbol::new("x", SymbolScope::Free, 0));

        let (_, innermost) = table.leave_scope().context("innermost")?;
        assert_eq!(innermost, vec![Symbol::new("x", SymbolScope::Free, 0)]);

        let (_, middle) = table.leave_scope().context("middle")?;
        assert_eq!(middle, vec![Symbol::new("x", SymbolScope::Local, 0)]);
        Ok(())
    }

    #[test]
    fn test_resolve_builtins_from_any_depth() -> Result<()> {
        let mut table = SymbolTable::new();
        let builtins = ["len", "print", "first"];
        for (index, name) in builtins.iter().enumerate() {
            table.define_builtin(index, name);
        }
        table.enter_scope();
        table.enter_scope();

        for (index, name) in builtins.iter().enumerate() {
            let symbol = table.resolve(name).context(*name)?;
            assert_eq!(symbol, Symbol::new(name, SymbolScope::Builtin, index));
        }
        let (_, free) = table.leave_scope().context("scope")?;
        assert!(free.is_empty());
        Ok(())
    }

    #[test]
    fn test_function_name_resolves_to_self() -> Result<()> {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define_function_name("fib");
        let symbol = table.resolve("fib").context("fib")?;
        assert_eq!(symbol, Symbol::new("fib", SymbolScope::Function, 0));

        // a parameter still takes slot 0
        assert_eq!(table.define("n").index, 0);
        Ok(())
    }

    #[test]
    fn test_shadowed_function_name() -> Result<()> {
        let mut table = SymbolTable::new();
        table.enter_scope();
        table.define_function_name("a");
        table.define("a");
        assert_eq!(
            table.resolve("a").context("a")?,
            Symbol::new("a", SymbolScope::Local, 0)
        );
        Ok(())
    }

    #[test]
    fn test_unresolvable() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.enter_scope();
        assert_eq!(table.resolve("b"), None);
        assert_eq!(table.leave_scope().map(|(_, free)| free), Some(vec![]));
    }

    #[test]
    fn test_leave_root_scope() {
        let mut table = SymbolTable::new();
        assert_eq!(table.leave_scope(), None);
        assert!(table.is_global());
    }

    #[test]
    fn test_resolve_assignable() {
        let mut table = SymbolTable::new();
        table.define("g");
        table.enter_scope();
        table.define("outer");
        table.enter_scope();
        table.define("inner");

        assert_eq!(
            table.resolve_assignable("g"),
            Some(Symbol::new("g", SymbolScope::Global, 0))
        );
        assert_eq!(
            table.resolve_assignable("inner"),
            Some(Symbol::new("inner", SymbolScope::Local, 0))
        );
        assert_eq!(table.resolve_assignable("outer"), None);

        // the lookup above records no capture
        assert_eq!(table.leave_scope().map(|(_, free)| free), Some(vec![]));
    }
}
