//! Aliases as shared, mutable objects.
//!
//! Every extent and synthesized column is represented by a [`Symbol`]
//! referenced from both the select list that introduces it and every
//! expression that uses it.  Collisions only mark a symbol for renaming;
//! the final spelling is picked once, at write time, so all mentions agree.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dialect;
use crate::fragment::SqlWriter;
use crate::tree::RowShape;

pub type SymbolRef = Rc<RefCell<Symbol>>;

#[derive(Debug)]
pub struct Symbol {
    /// The name the symbol was introduced under.
    pub name: String,
    /// The name that will be written; starts equal to `name`.
    pub new_name: String,
    /// Row shape when the symbol is an extent; `None` for column symbols.
    pub shape: Option<RowShape>,
    /// Column symbols synthesized under this extent, keyed lowercase.
    pub columns: HashMap<String, SymbolRef>,
    pub needs_renaming: bool,
    /// Present when this symbol stands for a join.
    pub join: Option<JoinData>,
}

impl Symbol {
    pub fn new(name: &str, shape: Option<RowShape>) -> SymbolRef {
        Rc::new(RefCell::new(Symbol {
            name: name.to_string(),
            new_name: name.to_string(),
            shape,
            columns: HashMap::new(),
            needs_renaming: false,
            join: None,
        }))
    }

    pub fn new_join(name: &str, shape: Option<RowShape>, extents: Vec<SymbolRef>) -> SymbolRef {
        let mut name_to_extent = HashMap::new();
        for extent in &extents {
            let key = extent.borrow().name.to_lowercase();
            name_to_extent.insert(key, extent.clone());
        }
        Rc::new(RefCell::new(Symbol {
            name: name.to_string(),
            new_name: name.to_string(),
            shape,
            columns: HashMap::new(),
            needs_renaming: false,
            join: Some(JoinData {
                extent_list: extents.clone(),
                name_to_extent,
                is_nested_join: false,
                column_list: Vec::new(),
                flattened_extent_list: extents,
            }),
        }))
    }
}

/// The extra bookkeeping a join symbol carries.
#[derive(Debug)]
pub struct JoinData {
    /// Immediate inputs of the join.
    pub extent_list: Vec<SymbolRef>,
    /// Inputs by their bound names, for property resolution.
    pub name_to_extent: HashMap<String, SymbolRef>,
    /// A nested join is a blocking scope: the subquery renames its columns,
    /// so property chains through it go via [`SymbolPair`].
    pub is_nested_join: bool,
    /// Column symbols of a nested join's select list.
    pub column_list: Vec<SymbolRef>,
    /// Every base extent under this join, joins recursively expanded.
    pub flattened_extent_list: Vec<SymbolRef>,
}

/// A property chain caught mid-resolution: `source` is the nested join
/// alias, `column` the extent reached so far.  Further property accesses
/// narrow `column` until it lands on a real column symbol.
#[derive(Debug, Clone)]
pub struct SymbolPair {
    pub source: SymbolRef,
    pub column: SymbolRef,
}

/// Variable scopes for the visit, innermost last.  Names are compared
/// case-insensitively.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, SymbolRef>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn add(&mut self, name: &str, symbol: SymbolRef) {
        debug_assert!(!self.scopes.is_empty(), "binding {name} outside any scope");
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_lowercase(), symbol);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolRef> {
        let key = name.to_lowercase();
        self.scopes.iter().rev().find_map(|scope| scope.get(&key).cloned())
    }
}

/// Used alias names with the next rename counter for each, keyed lowercase.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: HashMap<String, usize>,
}

impl NameRegistry {
    pub fn register(&mut self, name: &str) {
        self.names.entry(name.to_lowercase()).or_insert(0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_lowercase())
    }

    /// Picks `{base}{n}` for the smallest n that is still free, remembers
    /// where the search stopped, and claims the new name.
    pub fn rename(&mut self, base: &str) -> String {
        let key = base.to_lowercase();
        let mut i = self.names.get(&key).copied().unwrap_or(0);
        let new_name = loop {
            i += 1;
            let candidate = format!("{base}{i}");
            if !self.contains(&candidate) {
                break candidate;
            }
        };
        self.names.insert(key, i);
        self.names.insert(new_name.to_lowercase(), 0);
        new_name
    }
}

/// The two global name pools of one generation run: extent aliases and
/// column aliases never consult each other.
#[derive(Debug, Default)]
pub struct Naming {
    pub extent_names: NameRegistry,
    pub column_names: NameRegistry,
}

impl Naming {
    pub fn new() -> Self {
        Naming::default()
    }
}

/// Serializes a symbol, fixing its final name first if a collision was
/// recorded.  The flag is cleared so later mentions reuse the same pick.
pub fn write_symbol(symbol: &SymbolRef, w: &mut SqlWriter, naming: &mut Naming) {
    let pending = {
        let s = symbol.borrow();
        if s.needs_renaming { Some(s.new_name.clone()) } else { None }
    };
    if let Some(base) = pending {
        let new_name = naming.column_names.rename(&base);
        let mut s = symbol.borrow_mut();
        s.new_name = new_name;
        s.needs_renaming = false;
    }
    let quoted = dialect::quote_identifier(&symbol.borrow().new_name);
    w.write(&quoted);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_to_string(symbol: &SymbolRef, naming: &mut Naming) -> String {
        let mut w = SqlWriter::new();
        w.indent();
        write_symbol(symbol, &mut w, naming);
        w.into_string()
    }

    #[test]
    fn rename_walks_the_counter_past_taken_names() {
        let mut registry = NameRegistry::default();
        registry.register("Id");
        assert_eq!(registry.rename("Id"), "Id1");
        assert_eq!(registry.rename("Id"), "Id2");
        // the picked names are claimed too
        assert!(registry.contains("id1"));
        assert!(registry.contains("ID2"));
    }

    #[test]
    fn rename_skips_names_claimed_up_front() {
        let mut registry = NameRegistry::default();
        registry.register("c");
        registry.register("c1");
        registry.register("c2");
        assert_eq!(registry.rename("c"), "c3");
    }

    #[test]
    fn scopes_shadow_and_restore() {
        let mut table = SymbolTable::new();
        table.enter_scope();
        let outer = Symbol::new("c", None);
        table.add("c", outer.clone());

        table.enter_scope();
        let inner = Symbol::new("c", None);
        table.add("c", inner.clone());
        let hit = table.lookup("C").unwrap();
        assert!(Rc::ptr_eq(&hit, &inner));
        table.exit_scope();

        let hit = table.lookup("c").unwrap();
        assert!(Rc::ptr_eq(&hit, &outer));
        table.exit_scope();
        assert!(table.lookup("c").is_none());
    }

    #[test]
    fn flagged_symbols_rename_once_and_stay_renamed() {
        let mut naming = Naming::new();
        naming.column_names.register("Id");
        let symbol = Symbol::new("Id", None);
        symbol.borrow_mut().needs_renaming = true;

        assert_eq!(write_to_string(&symbol, &mut naming), "[Id1]");
        // second write keeps the pick
        assert_eq!(write_to_string(&symbol, &mut naming), "[Id1]");
        assert!(!symbol.borrow().needs_renaming);
    }

    #[test]
    fn join_symbols_index_their_extents_by_name() {
        let a = Symbol::new("a", None);
        let b = Symbol::new("b", None);
        let join = Symbol::new_join("j", None, vec![a.clone(), b]);
        let j = join.borrow();
        let data = j.join.as_ref().unwrap();
        assert!(Rc::ptr_eq(data.name_to_extent.get("a").unwrap(), &a));
        assert_eq!(data.extent_list.len(), 2);
    }
}
