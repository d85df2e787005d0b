//! The context: owner of the dictionary, loaded modules and the compiled
//! schema.
//!
//! Modules are registered by parsing text (or loading files from the search
//! directories), then the whole schema set is recompiled. Compilation is
//! all-or-nothing: the previous compiled set stays in place unless the new
//! one builds completely.

use std::path::PathBuf;

use bitflags::bitflags;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::base::{IStr, Interner};
use crate::error::{Error, Result};
use crate::parser::{ParsedModule, parse_yang_in, parse_yin_in};
use crate::schema::compile::{ParsedEntry, compile_set};
use crate::schema::{ModuleId, SchemaModule, SchemaSet, SnodeId};

bitflags! {
    /// Context behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContextOptions: u8 {
        /// Do not implicitly search the current directory for imports.
        const DISABLE_SEARCHDIR_CWD = 0x01;
        /// Do not search any directory; all imports must be preloaded.
        const DISABLE_SEARCHDIRS = 0x02;
        /// Modules referenced by identityref/leafref targets are
        /// auto-implemented.
        const REF_IMPLEMENTED = 0x04;
        /// Every loaded module is implemented.
        const ALL_IMPLEMENTED = 0x08;
        /// Do not expose ietf-yang-library data.
        const NO_YANGLIB = 0x10;
    }
}

/// Schema input/output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Yang,
    Yin,
}

/// The owner of all loaded modules, the dictionary and the compiled schema.
#[derive(Debug, Default)]
pub struct Context {
    dict: Interner,
    options: ContextOptions,
    searchdirs: Vec<PathBuf>,
    /// Main modules by name, in registration order (= compilation order).
    parsed: IndexMap<IStr, ParsedEntry>,
    /// Submodules by name.
    submodules: IndexMap<IStr, ParsedModule>,
    /// Enabled `(module, feature)` pairs.
    enabled_features: FxHashSet<(IStr, IStr)>,
    set: SchemaSet,
}

impl Context {
    pub fn new(options: ContextOptions) -> Result<Context> {
        Ok(Context { options, ..Default::default() })
    }

    /// The compiled schema tables. Frozen between load calls; safe to share
    /// for concurrent reads.
    pub fn schema(&self) -> &SchemaSet {
        &self.set
    }

    pub fn options(&self) -> ContextOptions {
        self.options
    }

    /// The string dictionary.
    pub fn dictionary(&self) -> &Interner {
        &self.dict
    }

    /// Add a module search directory.
    pub fn set_searchdir(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::not_found(format!(
                "search directory \"{}\" does not exist",
                dir.display()
            )));
        }
        if !self.searchdirs.contains(&dir) {
            self.searchdirs.push(dir);
        }
        Ok(())
    }

    /// Enable a feature on a loaded module and recompile.
    pub fn enable_feature(&mut self, module: &str, feature: &str) -> Result<()> {
        if !self.parsed.contains_key(module) {
            return Err(Error::not_found(format!("module \"{module}\" is not loaded")));
        }
        let key = (self.dict.intern(module), self.dict.intern(feature));
        self.enabled_features.insert(key);
        self.recompile()
    }

    /// Parse a module (or submodule) from text and recompile the context.
    /// Returns the compiled module id for main modules.
    pub fn parse_module_str(
        &mut self,
        text: &str,
        format: SchemaFormat,
        implement: bool,
    ) -> Result<Option<ModuleId>> {
        let mut added: Vec<(IStr, bool)> = Vec::new();
        let result = self.register_module_str(text, format, implement, &mut added);
        match result {
            Ok(name) => match self.recompile() {
                Ok(()) => Ok(self.set.find_module(&name)),
                Err(e) => {
                    self.rollback(added);
                    Err(e)
                }
            },
            Err(e) => {
                self.rollback(added);
                Err(e)
            }
        }
    }

    /// Load `name[@revision]` from the search directories and recompile.
    pub fn load_module(&mut self, name: &str, revision: Option<&str>) -> Result<ModuleId> {
        if let Some(id) = self.set.find_module(name) {
            if revision.is_none()
                || self.set.module(id).revision.as_deref() == revision
            {
                // Already loaded; ensure it is implemented.
                let key = self.dict.intern(name);
                let mut needs_recompile = false;
                if let Some(entry) = self.parsed.get_mut(&key) {
                    if !entry.implemented {
                        entry.implemented = true;
                        needs_recompile = true;
                    }
                }
                if needs_recompile {
                    self.recompile()?;
                }
                return self
                    .set
                    .find_module(name)
                    .ok_or_else(|| Error::Internal("module vanished after recompile".into()));
            }
            return Err(Error::duplicate(format!(
                "module \"{name}\" is already loaded with a different revision"
            )));
        }

        let mut added: Vec<(IStr, bool)> = Vec::new();
        let result = self
            .read_module_file(name, revision)
            .and_then(|(text, format)| {
                self.register_module_str(&text, format, true, &mut added)
            });
        match result {
            Ok(loaded_name) => {
                if &*loaded_name != name {
                    self.rollback(added);
                    return Err(Error::semantic(format!(
                        "file for \"{name}\" defines module \"{loaded_name}\""
                    )));
                }
                match self.recompile() {
                    Ok(()) => self.set.find_module(name).ok_or_else(|| {
                        Error::Internal("module missing after compile".into())
                    }),
                    Err(e) => {
                        self.rollback(added);
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.rollback(added);
                Err(e)
            }
        }
    }

    fn rollback(&mut self, added: Vec<(IStr, bool)>) {
        for (name, submodule) in added {
            if submodule {
                self.submodules.shift_remove(&name);
            } else {
                self.parsed.shift_remove(&name);
            }
        }
    }

    /// Parse and register one module plus its import/include closure.
    /// Records everything newly added so a failed compile can roll back.
    fn register_module_str(
        &mut self,
        text: &str,
        format: SchemaFormat,
        implement: bool,
        added: &mut Vec<(IStr, bool)>,
    ) -> Result<IStr> {
        let pm = match format {
            SchemaFormat::Yang => parse_yang_in(&mut self.dict, text)?,
            SchemaFormat::Yin => parse_yin_in(&mut self.dict, text)?,
        };
        let name = self.dict.intern(pm.name());
        let implement = implement || self.options.contains(ContextOptions::ALL_IMPLEMENTED);
        debug!(module = %name, submodule = pm.is_submodule(), "registering module");

        if pm.is_submodule() {
            if !self.submodules.contains_key(&name) {
                self.submodules.insert(name.clone(), pm.clone());
                added.push((name.clone(), true));
            }
        } else if self.parsed.contains_key(&name) {
            if implement {
                self.parsed.get_mut(&name).expect("just checked").implemented = true;
            }
        } else {
            self.parsed
                .insert(name.clone(), ParsedEntry { module: pm.clone(), implemented: implement });
            added.push((name.clone(), false));
        }

        // Pull in the closure of imports and includes.
        let deps: Vec<(String, Option<String>, bool)> = pm
            .imports()
            .map(|i| (i.module.to_string(), i.revision.map(String::from), false))
            .chain(
                pm.includes()
                    .map(|i| (i.submodule.to_string(), i.revision.map(String::from), true)),
            )
            .collect();
        for (dep, dep_revision, is_include) in deps {
            let present = if is_include {
                self.submodules.contains_key(dep.as_str())
            } else {
                self.parsed.contains_key(dep.as_str())
            };
            if present {
                continue;
            }
            let (dep_text, dep_format) = self.read_module_file(&dep, dep_revision.as_deref())?;
            let dep_implement = self.options.contains(ContextOptions::ALL_IMPLEMENTED)
                || self.options.contains(ContextOptions::REF_IMPLEMENTED);
            self.register_module_str(&dep_text, dep_format, dep_implement, added)?;
        }
        Ok(name)
    }

    /// Locate `name[@revision].yang|.yin` in the search directories.
    fn read_module_file(
        &self,
        name: &str,
        revision: Option<&str>,
    ) -> Result<(String, SchemaFormat)> {
        if self.options.contains(ContextOptions::DISABLE_SEARCHDIRS) {
            return Err(Error::not_found(format!(
                "module \"{name}\" is not loaded and directory search is disabled"
            )));
        }
        let mut dirs: Vec<PathBuf> = Vec::new();
        if !self.options.contains(ContextOptions::DISABLE_SEARCHDIR_CWD) {
            dirs.push(PathBuf::from("."));
        }
        dirs.extend(self.searchdirs.iter().cloned());

        let mut candidates = Vec::new();
        if let Some(rev) = revision {
            candidates.push(format!("{name}@{rev}.yang"));
            candidates.push(format!("{name}@{rev}.yin"));
        }
        candidates.push(format!("{name}.yang"));
        candidates.push(format!("{name}.yin"));

        for dir in &dirs {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.is_file() {
                    let text = std::fs::read_to_string(&path)?;
                    let format = if candidate.ends_with(".yin") {
                        SchemaFormat::Yin
                    } else {
                        SchemaFormat::Yang
                    };
                    debug!(module = name, path = %path.display(), "loading module file");
                    return Ok((text, format));
                }
            }
        }
        Err(Error::not_found(format!(
            "module file for \"{name}\" not found in the search directories"
        )))
    }

    /// Rebuild the compiled schema from the registered modules.
    /// The previous set is kept unless the whole build succeeds.
    fn recompile(&mut self) -> Result<()> {
        let new_set = compile_set(
            &self.parsed,
            &self.submodules,
            &self.enabled_features,
            &mut self.dict,
        )?;
        self.set = new_set;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// A compiled module by name and optionally revision.
    pub fn get_module(&self, name: &str, revision: Option<&str>) -> Option<&SchemaModule> {
        let id = self.set.find_module(name)?;
        let module = self.set.module(id);
        match revision {
            Some(rev) if module.revision.as_deref() != Some(rev) => None,
            _ => Some(module),
        }
    }

    /// The implemented module with the given name.
    pub fn get_module_implemented(&self, name: &str) -> Option<&SchemaModule> {
        self.get_module(name, None).filter(|m| m.implemented)
    }

    /// Iterate over all compiled modules.
    pub fn modules(&self) -> impl Iterator<Item = &SchemaModule> {
        self.set.modules.iter()
    }

    /// The parsed (pre-compilation) form of a loaded module.
    pub fn get_parsed_module(&self, name: &str) -> Option<&ParsedModule> {
        self.parsed.get(name).map(|e| &e.module)
    }

    /// Find a schema node by absolute path with module-name qualifiers,
    /// e.g. `/a:cont/leaf`.
    pub fn find_path(&self, path: &str) -> Result<SnodeId> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| Error::syntax(format!("path \"{path}\" is not absolute")))?;
        let mut current: Option<SnodeId> = None;
        let mut current_module: Option<ModuleId> = None;
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(Error::syntax(format!("empty segment in \"{path}\"")));
            }
            let (module_id, name) = match segment.split_once(':') {
                Some((module_name, n)) => {
                    let id = self.set.find_module(module_name).ok_or_else(|| {
                        Error::not_found(format!("module \"{module_name}\" not found"))
                    })?;
                    (id, n)
                }
                None => {
                    let id = current_module.ok_or_else(|| {
                        Error::syntax(format!(
                            "first segment of \"{path}\" must be module-qualified"
                        ))
                    })?;
                    (id, segment)
                }
            };
            let found = self
                .set
                .find_data_child(module_id, current, module_id, name)
                .ok_or_else(|| {
                    Error::not_found(format!("node \"{segment}\" not found in \"{path}\""))
                })?;
            current = Some(found);
            current_module = Some(module_id);
        }
        current.ok_or_else(|| Error::syntax(format!("empty path \"{path}\"")))
    }

    /// A snapshot of the ietf-yang-library module list, or `None` when
    /// disabled.
    pub fn yang_library_data(&self) -> Option<serde_json::Value> {
        if self.options.contains(ContextOptions::NO_YANGLIB) {
            return None;
        }
        let modules: Vec<serde_json::Value> = self
            .set
            .modules
            .iter()
            .map(|m| {
                serde_json::json!({
                    "name": &*m.name,
                    "revision": m.revision.as_deref().unwrap_or(""),
                    "namespace": &*m.namespace,
                    "conformance-type": if m.implemented { "implement" } else { "import" },
                })
            })
            .collect();
        let set_id = format!("{:x}", self.set.modules.len() * 31 + self.set.snodes.len());
        Some(serde_json::json!({
            "ietf-yang-library:modules-state": {
                "module-set-id": set_id,
                "module": modules,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOD_A: &str = r#"
        module a {
          namespace "urn:tests:a";
          prefix a;
          leaf foo { type string; }
        }
    "#;

    #[test]
    fn test_parse_and_lookup() {
        let mut ctx = Context::new(ContextOptions::default()).unwrap();
        let id = ctx.parse_module_str(MOD_A, SchemaFormat::Yang, true).unwrap();
        assert!(id.is_some());
        let m = ctx.get_module("a", None).unwrap();
        assert_eq!(&*m.namespace, "urn:tests:a");
        assert!(m.implemented);
        assert!(ctx.find_path("/a:foo").is_ok());
        assert!(ctx.find_path("/a:bar").is_err());
    }

    #[test]
    fn test_failed_compile_rolls_back() {
        let mut ctx = Context::new(ContextOptions::default()).unwrap();
        ctx.parse_module_str(MOD_A, SchemaFormat::Yang, true).unwrap();
        // leafref to a missing node fails compilation.
        let bad = r#"
            module b {
              namespace "urn:tests:b";
              prefix b;
              leaf r { type leafref { path "/b:nothing"; } }
            }
        "#;
        let err = ctx.parse_module_str(bad, SchemaFormat::Yang, true).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        // The context still holds only module a, fully compiled.
        assert!(ctx.get_module("a", None).is_some());
        assert!(ctx.get_module("b", None).is_none());
        assert!(ctx.get_parsed_module("b").is_none());
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let mut ctx = Context::new(ContextOptions::default()).unwrap();
        ctx.parse_module_str(MOD_A, SchemaFormat::Yang, true).unwrap();
        let clash = r#"
            module c {
              namespace "urn:tests:a";
              prefix c;
            }
        "#;
        assert!(ctx.parse_module_str(clash, SchemaFormat::Yang, true).is_err());
        assert!(ctx.get_module("c", None).is_none());
    }

    #[test]
    fn test_yang_library() {
        let mut ctx = Context::new(ContextOptions::default()).unwrap();
        ctx.parse_module_str(MOD_A, SchemaFormat::Yang, true).unwrap();
        let lib = ctx.yang_library_data().unwrap();
        let modules = &lib["ietf-yang-library:modules-state"]["module"];
        assert_eq!(modules.as_array().unwrap().len(), 1);

        let mut quiet = Context::new(ContextOptions::NO_YANGLIB).unwrap();
        quiet.parse_module_str(MOD_A, SchemaFormat::Yang, true).unwrap();
        assert!(quiet.yang_library_data().is_none());
    }
}
