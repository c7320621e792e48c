//! Hierarchical key/value data store.
//!
//! Values are addressed by a path and a name, both of which may be
//! shaped like filesystem paths. A path or name ending in `#` is
//! indexed: storing appends the next free index (`Item#1`, `Item#2`)
//! and writes the final form back, while a trailing `n+` retrieves the
//! first entry after index `n`, clearing the string when the end is
//! reached. Remove and copy accept `*` and `?` wildcards.

pub mod wildcard;

use std::collections::BTreeMap;

use crate::runtime::natives::{get_argument, required, NativeCtx};
use crate::runtime::ops::to_int;
use crate::runtime::status::{ScriptError, Status};
use crate::runtime::{ArgMap, Engine};

use wildcard::wild_match;

type Entries = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct DataStore {
    store: BTreeMap<String, Entries>,
}

/// Splits `prefix#suffix`, where the `#` has to sit in the last path
/// segment.
fn split_path(name: &str) -> Option<(&str, &str)> {
    let start = name.rfind('/').map_or(0, |p| p + 1);
    let at = name[start..].find('#')? + start;
    Some((&name[..at], &name[at + 1..]))
}

/// Resolves an indexed path against the existing keys. With `new` the
/// path becomes the next free index, otherwise the first index after
/// the one given. Returns false and clears the path when nothing
/// follows.
fn select_name<'a, I>(keys: I, path: &mut String, new: bool) -> bool
where
    I: Iterator<Item = &'a String>,
{
    let Some((prefix, suffix)) = split_path(path) else {
        return true;
    };
    let mut prev = 0i64;
    if !suffix.is_empty() {
        if suffix.ends_with('+') {
            prev = to_int(suffix);
        } else {
            // a fixed index names a specific entry
            return true;
        }
    }

    let prefix = prefix.to_string();
    let mut next: Option<i64> = None;
    for key in keys {
        let Some((cur_prefix, cur_suffix)) = split_path(key) else {
            continue;
        };
        if cur_prefix != prefix {
            continue;
        }
        let cur = to_int(cur_suffix);
        if new {
            prev = prev.max(cur);
        } else if prev < cur && next.map_or(true, |n| cur < n) {
            next = Some(cur);
        }
    }

    let next = match next {
        Some(n) => n,
        None if new => prev + 1,
        None => {
            path.clear();
            return false;
        }
    };
    *path = format!("{prefix}#{next}");
    true
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select_data(&mut self, path: &mut String, new: bool) -> Option<&mut Entries> {
        if !select_name(self.store.keys(), path, new) {
            return None;
        }
        Some(self.store.entry(path.clone()).or_default())
    }

    fn select_entry(&mut self, path: &mut String, name: &mut String, new: bool) -> Option<&mut String> {
        let data = self.select_data(path, new)?;
        if !select_name(data.keys(), name, new) {
            return None;
        }
        Some(data.entry(name.clone()).or_default())
    }

    /// Stores `value`, resolving trailing `#` indexes in `path` and
    /// `name` to their final form.
    pub fn store_data(&mut self, path: &mut String, name: &mut String, value: &str) {
        if let Some(entry) = self.select_entry(path, name, true) {
            *entry = value.to_string();
        }
    }

    /// Looks up a value; `path` and `name` may use the `n+` iteration
    /// form and come back resolved. A miss clears `value`.
    pub fn retrieve_data(&mut self, path: &mut String, name: &mut String, value: &mut String) {
        match self.select_entry(path, name, false) {
            Some(entry) => *value = entry.clone(),
            None => value.clear(),
        }
    }

    /// Lists `(path, name)` pairs matching the wildcard filters. With
    /// no name filter, paths are listed once with an empty name.
    pub fn enum_store(&self, path: Option<&str>, name: Option<&str>) -> Vec<(String, String)> {
        let mut found = Vec::new();
        for (key, data) in &self.store {
            if let Some(pat) = path {
                if wild_match(pat, key).is_none() {
                    continue;
                }
            }
            match name {
                None => found.push((key.clone(), String::new())),
                Some(pat) => {
                    for entry in data.keys() {
                        if wild_match(pat, entry).is_some() {
                            found.push((key.clone(), entry.clone()));
                        }
                    }
                }
            }
        }
        found
    }

    /// Removes matching entries, or whole paths when no name filter is
    /// given.
    pub fn remove_data(&mut self, path: Option<&str>, name: Option<&str>) {
        for (key, entry) in self.enum_store(path, name) {
            if entry.is_empty() {
                self.store.remove(&key);
            } else if let Some(data) = self.store.get_mut(&key) {
                data.remove(&entry);
            }
        }
    }

    /// Copies matching data below `new_path`, keeping the part of each
    /// source path the wildcard did not consume. Existing entries at
    /// the target are not overwritten.
    pub fn copy_data(&mut self, path: &str, name: Option<&str>, new_path: &mut String) {
        let matches = self.enum_store(Some(path), name);
        // resolve a trailing # up front so every copy lands under the
        // same fixed index
        let _ = self.select_data(new_path, true);

        for (key, entry) in matches {
            let mut target = new_path.clone();
            if let Some(rest) = wild_match(path, &key) {
                target.push_str(rest);
            }
            let picked: Vec<(String, String)> = match self.store.get(&key) {
                Some(data) if entry.is_empty() => {
                    data.iter().map(|(n, v)| (n.clone(), v.clone())).collect()
                }
                Some(data) => data
                    .get(&entry)
                    .map(|v| vec![(entry.clone(), v.clone())])
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            if let Some(data) = self.select_data(&mut target, true) {
                for (n, v) in picked {
                    data.entry(n).or_insert(v);
                }
            }
        }
    }

    pub fn print_store(&self) -> String {
        let mut out = String::new();
        for (key, data) in &self.store {
            for (name, value) in data {
                out.push_str(&format!("{key}\\{name}={value}\n"));
            }
        }
        out
    }
}

/// Path up to the last `/`, or empty at the root.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(at) => &path[..at],
        None => "",
    }
}

/// Registers the data store natives on an engine. Runs need a
/// [`DataStore`] passed as the host object.
pub fn register(engine: &mut Engine) {
    engine.register_native("StoreData", fx_store_data);
    engine.register_native("RetrieveData", fx_retrieve_data);
    engine.register_native("RemoveData", fx_remove_data);
    engine.register_native("CopyData", fx_copy_data);
    engine.register_native("ParentPath", fx_parent_path);
}

fn host_store<'a>(ctx: &'a mut NativeCtx<'_>) -> Result<&'a mut DataStore, ScriptError> {
    ctx.host
        .as_mut()
        .and_then(|h| h.downcast_mut::<DataStore>())
        .ok_or_else(|| ScriptError::Native("no data store attached".to_string()))
}

fn settle(result: Result<(), ScriptError>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(err) => Status::Err(err),
    }
}

fn fx_store_data(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(store_data_impl(ctx, args))
}

fn store_data_impl(ctx: &mut NativeCtx<'_>, args: &ArgMap) -> Result<(), ScriptError> {
    let store = host_store(ctx)?;
    let path_cell = get_argument(args, "Path");
    let name_cell = required(args, "Name")?;
    let value = required(args, "Value")?.borrow().clone();

    let mut path = path_cell.as_ref().map_or_else(String::new, |c| c.borrow().clone());
    let mut name = name_cell.borrow().clone();
    store.store_data(&mut path, &mut name, &value);
    if let Some(cell) = path_cell {
        *cell.borrow_mut() = path;
    }
    *name_cell.borrow_mut() = name;
    Ok(())
}

fn fx_retrieve_data(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(retrieve_data_impl(ctx, args))
}

fn retrieve_data_impl(ctx: &mut NativeCtx<'_>, args: &ArgMap) -> Result<(), ScriptError> {
    let store = host_store(ctx)?;
    let path_cell = get_argument(args, "Path");
    let name_cell = required(args, "Name")?;
    let value_cell = required(args, "Value")?;

    let mut path = path_cell.as_ref().map_or_else(String::new, |c| c.borrow().clone());
    let mut name = name_cell.borrow().clone();
    let mut value = String::new();
    store.retrieve_data(&mut path, &mut name, &mut value);
    if let Some(cell) = path_cell {
        *cell.borrow_mut() = path;
    }
    *name_cell.borrow_mut() = name;
    *value_cell.borrow_mut() = value;
    Ok(())
}

fn fx_remove_data(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(remove_data_impl(ctx, args))
}

fn remove_data_impl(ctx: &mut NativeCtx<'_>, args: &ArgMap) -> Result<(), ScriptError> {
    let store = host_store(ctx)?;
    let path = get_argument(args, "Path").map(|c| c.borrow().clone());
    let name = get_argument(args, "Name").map(|c| c.borrow().clone());
    if path.is_none() && name.is_none() {
        return Err(ScriptError::Argument);
    }
    store.remove_data(path.as_deref(), name.as_deref());
    Ok(())
}

fn fx_copy_data(ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(copy_data_impl(ctx, args))
}

fn copy_data_impl(ctx: &mut NativeCtx<'_>, args: &ArgMap) -> Result<(), ScriptError> {
    let store = host_store(ctx)?;
    let path = required(args, "Path")?.borrow().clone();
    let name = get_argument(args, "Name").map(|c| c.borrow().clone());
    let new_path_cell = required(args, "NewPath")?;

    let mut new_path = new_path_cell.borrow().clone();
    store.copy_data(&path, name.as_deref(), &mut new_path);
    *new_path_cell.borrow_mut() = new_path;
    Ok(())
}

fn fx_parent_path(_ctx: &mut NativeCtx<'_>, args: &mut ArgMap) -> Status {
    settle(parent_path_impl(args))
}

fn parent_path_impl(args: &ArgMap) -> Result<(), ScriptError> {
    let path = required(args, "Path")?.borrow().clone();
    *required(args, "Parent")?.borrow_mut() = parent_path(&path).to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> DataStore {
        let mut store = DataStore::new();
        for (path, name, value) in [
            ("jobs/a", "url", "http://a"),
            ("jobs/a", "state", "done"),
            ("jobs/b", "url", "http://b"),
        ] {
            let mut path = path.to_string();
            let mut name = name.to_string();
            store.store_data(&mut path, &mut name, value);
        }
        store
    }

    #[test]
    fn indexed_names_get_the_next_free_index() {
        let mut store = DataStore::new();
        let mut path = String::new();
        for expected in ["Item#1", "Item#2", "Item#3"] {
            let mut name = "Item#".to_string();
            store.store_data(&mut path, &mut name, "v");
            assert_eq!(name, expected);
        }

        // a fixed index is left alone
        let mut name = "Item#7".to_string();
        store.store_data(&mut path, &mut name, "v");
        assert_eq!(name, "Item#7");

        let mut name = "Item#".to_string();
        store.store_data(&mut path, &mut name, "v");
        assert_eq!(name, "Item#8");
    }

    #[test]
    fn iteration_walks_entries_and_ends_empty() {
        let mut store = DataStore::new();
        let mut path = String::new();
        for value in ["first", "second"] {
            let mut name = "Item#".to_string();
            store.store_data(&mut path, &mut name, value);
        }

        let mut name = "Item#".to_string();
        let mut seen = Vec::new();
        loop {
            name.push('+');
            let mut value = String::new();
            store.retrieve_data(&mut path, &mut name, &mut value);
            if name.is_empty() {
                break;
            }
            seen.push((name.clone(), value));
        }
        assert_eq!(
            seen,
            [
                ("Item#1".to_string(), "first".to_string()),
                ("Item#2".to_string(), "second".to_string()),
            ]
        );
    }

    #[test]
    fn retrieve_miss_clears_the_value() {
        let mut store = seeded();
        let mut path = "jobs/a".to_string();
        let mut name = "missing".to_string();
        let mut value = "stale".to_string();
        store.retrieve_data(&mut path, &mut name, &mut value);
        assert_eq!(value, "");
    }

    #[test]
    fn enum_and_remove_use_wildcards() {
        let mut store = seeded();
        let listed = store.enum_store(Some("jobs/*"), Some("url"));
        assert_eq!(
            listed,
            [
                ("jobs/a".to_string(), "url".to_string()),
                ("jobs/b".to_string(), "url".to_string()),
            ]
        );

        store.remove_data(Some("jobs/*"), Some("url"));
        assert!(store.enum_store(None, Some("url")).is_empty());
        // the paths themselves survive a name filtered remove
        assert_eq!(store.enum_store(Some("jobs/a"), None).len(), 1);

        store.remove_data(Some("jobs/*"), None);
        assert!(store.enum_store(None, None).is_empty());
    }

    #[test]
    fn copy_keeps_the_unmatched_path_tail() {
        let mut store = seeded();
        let mut new_path = "done#".to_string();
        store.copy_data("jobs*", None, &mut new_path);
        assert_eq!(new_path, "done#1");

        let mut path = "done#1/a".to_string();
        let mut name = "url".to_string();
        let mut value = String::new();
        store.retrieve_data(&mut path, &mut name, &mut value);
        assert_eq!(value, "http://a");

        let mut path = "done#1/b".to_string();
        store.retrieve_data(&mut path, &mut name, &mut value);
        assert_eq!(value, "http://b");
    }

    #[test]
    fn copy_does_not_overwrite_existing_entries() {
        let mut store = seeded();
        let mut path = "backup/a".to_string();
        let mut name = "url".to_string();
        store.store_data(&mut path, &mut name, "kept");

        let mut new_path = "backup/a".to_string();
        store.copy_data("jobs/a", None, &mut new_path);

        let mut value = String::new();
        let mut path = "backup/a".to_string();
        store.retrieve_data(&mut path, &mut name, &mut value);
        assert_eq!(value, "kept");
        let mut name = "state".to_string();
        store.retrieve_data(&mut path, &mut name, &mut value);
        assert_eq!(value, "done");
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_path("a/b/c"), "a/b");
        assert_eq!(parent_path("a"), "");
    }

    #[test]
    fn natives_write_back_through_the_cells() {
        use crate::runtime::frame::{new_value, VarMap};
        use std::any::Any;
        use turi_config::{LimitConfig, LoadConfig};
        use turi_log::{Level, Logger};

        let mut engine = Engine::new(
            Logger::new(Level::Error),
            LoadConfig::default(),
            LimitConfig::default(),
        );
        register(&mut engine);
        let mut store = DataStore::new();

        let args: ArgMap = [
            ("Name".to_string(), new_value("Item#")),
            ("Value".to_string(), new_value("payload")),
        ]
        .into();
        let mut ctx = NativeCtx {
            engine: &mut engine,
            gvars: VarMap::default(),
            host: Some(&mut store as &mut dyn Any),
        };
        assert_eq!(store_data_impl(&mut ctx, &args), Ok(()));
        assert_eq!(args["Name"].borrow().clone(), "Item#1");

        let args: ArgMap = [
            ("Name".to_string(), new_value("Item#1")),
            ("Value".to_string(), new_value("")),
        ]
        .into();
        let mut ctx = NativeCtx {
            engine: &mut engine,
            gvars: VarMap::default(),
            host: Some(&mut store as &mut dyn Any),
        };
        assert_eq!(retrieve_data_impl(&mut ctx, &args), Ok(()));
        assert_eq!(args["Value"].borrow().clone(), "payload");

        // without a host object the natives fail cleanly
        let mut ctx = NativeCtx {
            engine: &mut engine,
            gvars: VarMap::default(),
            host: None,
        };
        assert!(store_data_impl(&mut ctx, &args).is_err());
    }
}
