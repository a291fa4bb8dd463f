use std::collections::HashMap;
use std::rc::Rc;

use super::ast::Declarator;

/// One lexical scope. Lookups fall through to the enclosing scope.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, Rc<Declarator>>,
    parent: Option<Box<SymbolTable>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope nested in `parent`.
    pub fn with_parent(parent: SymbolTable) -> Self {
        SymbolTable {
            vars: HashMap::new(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Closes this scope, handing back the enclosing one. The outermost scope
    /// yields an empty table.
    pub fn into_parent(self) -> SymbolTable {
        self.parent.map(|p| *p).unwrap_or_default()
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<Declarator>> {
        match self.vars.get(name) {
            Some(decl) => Some(Rc::clone(decl)),
            None => self.parent.as_ref()?.lookup(name),
        }
    }

    /// True when `name` is declared in this scope itself, not an enclosing one.
    pub fn declares(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn declare(&mut self, decl: Rc<Declarator>) {
        self.vars.insert(decl.name.clone(), decl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::TypeName;
    use crate::descriptor::{JType, TypeKind};

    #[test]
    fn test_inner_scope_shadows_and_unwinds() {
        let mut top = SymbolTable::new();
        top.declare(Declarator::bound(JType::INT, "$1", 1));

        let mut inner = SymbolTable::with_parent(top);
        assert_eq!(inner.lookup("$1").unwrap().slot(), Some(1));
        inner.declare(Declarator::new(TypeName::Primitive(TypeKind::Long), "x"));
        assert!(inner.lookup("x").is_some());
        assert!(!inner.declares("$1"));

        let top = inner.into_parent();
        assert!(top.lookup("x").is_none());
        assert!(top.declares("$1"));
    }

    #[test]
    fn test_declarators_are_shared() {
        let mut table = SymbolTable::new();
        let decl = Declarator::new(TypeName::Class("String".into()), "s");
        table.declare(Rc::clone(&decl));
        decl.set_slot(4);
        assert_eq!(table.lookup("s").unwrap().slot(), Some(4));
    }
}
