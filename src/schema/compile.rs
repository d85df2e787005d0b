//! The schema compiler.
//!
//! Builds a fresh [`SchemaSet`] from the parsed modules registered in the
//! context. Compilation is multi-pass per module (imports, identities,
//! typedef chains, data nodes with `uses` expansion) followed by global
//! passes over the whole set (top-level augments, deviations, leafref
//! resolution, default storing, identity closure, duplicate checks).
//!
//! The caller keeps the old set until `compile_set` returns `Ok`, so a
//! failed compilation leaves the context untouched.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::base::{IStr, Interner};
use crate::error::{Error, Result};
use crate::parser::keywords::Keyword;
use crate::parser::stmt::{ParsedModule, Statement};
use crate::schema::types::{
    BitSpec, CompiledType, EnumSpec, IntKind, Pattern, TypeKind, compile_pattern,
    decimal64_domain, length_domain, restrict_ranges,
};
use crate::schema::value::{ValueFmt, store};
use crate::schema::{
    Identity, IdentityId, ModuleId, MustCond, PrefixMap, SchemaFlags, SchemaModule, SchemaNode,
    SchemaSet, SnodeId, SnodeKind, Status, Unique, WhenCond,
};
use crate::xpath::{Axis, Expr, NodeTest, PathStart, parse_xpath};

/// A registered module awaiting compilation.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub module: ParsedModule,
    pub implemented: bool,
}

/// Compile every registered module into a fresh schema set.
pub fn compile_set(
    parsed: &IndexMap<IStr, ParsedEntry>,
    submodules: &IndexMap<IStr, ParsedModule>,
    enabled_features: &FxHashSet<(IStr, IStr)>,
    interner: &mut Interner,
) -> Result<SchemaSet> {
    let mut compiler = Compiler {
        parsed,
        submodules,
        enabled: enabled_features,
        interner,
        set: SchemaSet::default(),
        compiled: FxHashMap::default(),
        compiling: Vec::new(),
        uses_stack: Vec::new(),
        raw_defaults: Vec::new(),
        raw_choice_defaults: Vec::new(),
    };

    for name in parsed.keys() {
        compiler.compile_module(name)?;
    }
    compiler.apply_augments()?;
    compiler.apply_deviations()?;
    compiler.compute_identity_closure();
    compiler.resolve_leafrefs()?;
    compiler.store_defaults()?;
    compiler.check_duplicates()?;
    Ok(compiler.set)
}

struct Compiler<'a, 'i> {
    parsed: &'a IndexMap<IStr, ParsedEntry>,
    submodules: &'a IndexMap<IStr, ParsedModule>,
    enabled: &'a FxHashSet<(IStr, IStr)>,
    interner: &'i mut Interner,
    set: SchemaSet,
    compiled: FxHashMap<IStr, ModuleId>,
    /// Modules currently in the `compiling` state (cycle detection).
    compiling: Vec<IStr>,
    /// Groupings currently being expanded (cycle detection).
    uses_stack: Vec<(IStr, IStr)>,
    /// Leaf / leaf-list defaults, stored after leafref resolution.
    raw_defaults: Vec<(SnodeId, IStr, Arc<PrefixMap>)>,
    /// Choice default case names, resolved after compilation.
    raw_choice_defaults: Vec<(SnodeId, IStr)>,
}

/// Statement context for one lexical scope: which module's statements are
/// being compiled (types and prefixes resolve there) and which module's
/// namespace the created nodes carry (differs under `uses` and `augment`).
#[derive(Clone)]
struct ModEnv<'a> {
    /// Namespace-owning module for created nodes.
    target: ModuleId,
    /// Module whose text is being compiled.
    def: &'a ParsedModule,
    def_id: ModuleId,
    prefixes: Arc<PrefixMap>,
    /// Enclosing statements carrying typedefs/groupings, outermost first.
    scopes: Vec<&'a Statement>,
}

/// Properties inherited down the schema tree.
#[derive(Clone, Copy)]
struct Inherit {
    config: bool,
    status: Status,
    /// Inside rpc/action/notification subtrees config does not apply.
    operation: bool,
}

impl Default for Inherit {
    fn default() -> Self {
        Self { config: true, status: Status::Current, operation: false }
    }
}

impl<'a> Compiler<'a, '_> {
    // ==================================================================
    // Module compilation
    // ==================================================================

    fn compile_module(&mut self, name: &str) -> Result<ModuleId> {
        if let Some(&id) = self.compiled.get(name) {
            return Ok(id);
        }
        if self.compiling.iter().any(|n| &**n == name) {
            return Err(Error::semantic(format!(
                "import cycle through module \"{name}\""
            )));
        }
        let entry = self
            .parsed
            .get(name)
            .ok_or_else(|| Error::not_found(format!("module \"{name}\" is not loaded")))?;
        let pm = &entry.module;
        debug!(module = name, "compiling module");
        self.compiling.push(self.interner.intern(name));

        let namespace = pm
            .namespace()
            .ok_or_else(|| Error::semantic(format!("module \"{name}\" has no namespace")))?;
        if let Some(other) = self.set.find_module_by_namespace(namespace) {
            return Err(Error::duplicate(format!(
                "namespace \"{namespace}\" is already used by module \"{}\"",
                self.set.module(other).name
            )));
        }
        let prefix = pm
            .prefix()
            .ok_or_else(|| Error::semantic(format!("module \"{name}\" has no prefix")))?;

        // Imports first (recursively), building the prefix resolver.
        let mut imports = Vec::new();
        let mut prefixes = PrefixMap::default();
        prefixes.insert(self.interner.intern(prefix), self.interner.intern(name));
        let import_views: Vec<(String, String)> = pm
            .imports()
            .map(|i| (i.prefix.to_string(), i.module.to_string()))
            .collect();
        for (imp_prefix, imp_module) in &import_views {
            let dep = self.compile_module(imp_module)?;
            imports.push((self.interner.intern(imp_prefix), dep));
            prefixes.insert(
                self.interner.intern(imp_prefix),
                self.interner.intern(imp_module),
            );
        }
        // Submodules share the main module's prefix map through their own
        // belongs-to prefix and imports.
        let submods: Vec<&'a ParsedModule> = self.submodules_of(pm)?;
        for sm in &submods {
            if let Some((_, bt_prefix)) = sm.belongs_to() {
                prefixes.insert(self.interner.intern(bt_prefix), self.interner.intern(name));
            }
            let sub_imports: Vec<(String, String)> = sm
                .imports()
                .map(|i| (i.prefix.to_string(), i.module.to_string()))
                .collect();
            for (imp_prefix, imp_module) in &sub_imports {
                let dep = self.compile_module(imp_module)?;
                imports.push((self.interner.intern(imp_prefix), dep));
                prefixes.insert(
                    self.interner.intern(imp_prefix),
                    self.interner.intern(imp_module),
                );
            }
        }
        let prefixes = Arc::new(prefixes);

        let module_id = ModuleId(self.set.modules.len() as u32);
        self.set.modules.push(SchemaModule {
            name: self.interner.intern(name),
            revision: pm.latest_revision().map(|r| self.interner.intern(r)),
            namespace: self.interner.intern(namespace),
            prefix: self.interner.intern(prefix),
            yang_version: pm.yang_version(),
            implemented: entry.implemented,
            imports,
            prefixes: Arc::clone(&prefixes),
            features: Vec::new(),
            identities: Vec::new(),
            children: Vec::new(),
            rpcs: Vec::new(),
            notifications: Vec::new(),
        });
        self.compiled.insert(self.interner.intern(name), module_id);

        // Statement roots: the module plus its submodules.
        let mut roots: Vec<&'a Statement> = vec![self.parsed.get(name).unwrap().module.root()];
        roots.extend(submods.iter().map(|sm| sm.root()));

        // Features.
        let mut features = Vec::new();
        for root in &roots {
            for f in root.find_all(Keyword::Feature) {
                features.push(self.interner.intern(f.arg()));
            }
        }
        self.set.module_mut(module_id).features = features;

        // Identities: register all first, then resolve bases.
        let mut identity_stmts: Vec<&'a Statement> = Vec::new();
        for root in &roots {
            identity_stmts.extend(root.find_all(Keyword::Identity));
        }
        let mut identity_ids = Vec::new();
        for ident in &identity_stmts {
            let ident_name = self.interner.intern(ident.arg());
            if self
                .set
                .module(module_id)
                .identities
                .iter()
                .any(|&i| self.set.identity(i).name == ident_name)
            {
                return Err(Error::duplicate(format!(
                    "identity \"{ident_name}\" defined twice in module \"{name}\""
                )));
            }
            let id = IdentityId(self.set.identities.len() as u32);
            self.set.identities.push(Identity {
                module: module_id,
                name: ident_name,
                bases: Vec::new(),
                derived: Vec::new(),
                status: parse_status(ident)?,
            });
            self.set.module_mut(module_id).identities.push(id);
            identity_ids.push(id);
        }
        for (ident, &id) in identity_stmts.iter().zip(&identity_ids) {
            let mut bases = Vec::new();
            for base in ident.find_all(Keyword::Base) {
                bases.push(self.resolve_identity_name(base.arg(), &prefixes, module_id)?);
            }
            self.set.identities[id.0 as usize].bases = bases;
        }

        // Data nodes, rpcs, notifications from every statement root.
        for root in roots.clone() {
            let env = ModEnv {
                target: module_id,
                def: self.module_of_root(root, pm, &submods),
                def_id: module_id,
                prefixes: Arc::clone(&prefixes),
                scopes: vec![root],
            };
            let inherit = Inherit::default();
            for stmt in data_def_stmts(root) {
                if let Some(id) = self.compile_data_node(stmt, &env, None, inherit)? {
                    self.set.module_mut(module_id).children.push(id);
                }
            }

            for rpc in root.find_all(Keyword::Rpc) {
                if let Some(id) = self.compile_operation(rpc, &env, None, SnodeKind::Rpc)? {
                    self.set.module_mut(module_id).rpcs.push(id);
                }
            }
            for notif in root.find_all(Keyword::Notification) {
                if let Some(id) = self.compile_notification(notif, &env, None)? {
                    self.set.module_mut(module_id).notifications.push(id);
                }
            }
        }

        self.compiling.pop();
        trace!(module = name, "module compiled");
        Ok(module_id)
    }

    fn submodules_of(&self, pm: &ParsedModule) -> Result<Vec<&'a ParsedModule>> {
        let mut out = Vec::new();
        for inc in pm.includes() {
            let sm = self.submodules.get(inc.submodule).ok_or_else(|| {
                Error::not_found(format!("submodule \"{}\" is not loaded", inc.submodule))
            })?;
            match sm.belongs_to() {
                Some((main, _)) if main == pm.name() => {}
                _ => {
                    return Err(Error::semantic(format!(
                        "submodule \"{}\" does not belong to module \"{}\"",
                        inc.submodule,
                        pm.name()
                    )));
                }
            }
            out.push(sm);
        }
        Ok(out)
    }

    /// Which parsed module a statement root came from (main or submodule).
    fn module_of_root(
        &self,
        root: &'a Statement,
        pm: &ParsedModule,
        submods: &[&'a ParsedModule],
    ) -> &'a ParsedModule {
        for sm in submods {
            if std::ptr::eq(sm.root(), root) {
                return sm;
            }
        }
        // Main module: re-borrow from the registry for the 'a lifetime.
        let entry = self.parsed.get(pm.name()).expect("module is registered");
        &entry.module
    }

    // ==================================================================
    // if-feature
    // ==================================================================

    /// Evaluate every `if-feature` on a statement.
    fn if_features_enabled(&mut self, stmt: &Statement, env: &ModEnv<'a>) -> Result<bool> {
        for cond in stmt.find_all(Keyword::IfFeature) {
            if !self.if_feature_expr(cond.arg(), env)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// YANG 1.1 if-feature-expr: `and` / `or` / `not` / parentheses.
    fn if_feature_expr(&mut self, text: &str, env: &ModEnv<'a>) -> Result<bool> {
        let tokens: Vec<String> = text
            .replace('(', " ( ")
            .replace(')', " ) ")
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let mut pos = 0usize;
        let result = self.iff_or(&tokens, &mut pos, env)?;
        if pos != tokens.len() {
            return Err(Error::syntax(format!("invalid if-feature expression \"{text}\"")));
        }
        Ok(result)
    }

    fn iff_or(&mut self, tokens: &[String], pos: &mut usize, env: &ModEnv<'a>) -> Result<bool> {
        let mut value = self.iff_and(tokens, pos, env)?;
        while tokens.get(*pos).map(|s| s.as_str()) == Some("or") {
            *pos += 1;
            let rhs = self.iff_and(tokens, pos, env)?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn iff_and(&mut self, tokens: &[String], pos: &mut usize, env: &ModEnv<'a>) -> Result<bool> {
        let mut value = self.iff_atom(tokens, pos, env)?;
        while tokens.get(*pos).map(|s| s.as_str()) == Some("and") {
            *pos += 1;
            let rhs = self.iff_atom(tokens, pos, env)?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn iff_atom(&mut self, tokens: &[String], pos: &mut usize, env: &ModEnv<'a>) -> Result<bool> {
        match tokens.get(*pos).map(|s| s.as_str()) {
            Some("not") => {
                *pos += 1;
                Ok(!self.iff_atom(tokens, pos, env)?)
            }
            Some("(") => {
                *pos += 1;
                let value = self.iff_or(tokens, pos, env)?;
                if tokens.get(*pos).map(|s| s.as_str()) != Some(")") {
                    return Err(Error::syntax("unbalanced parentheses in if-feature"));
                }
                *pos += 1;
                Ok(value)
            }
            Some(name) => {
                *pos += 1;
                let (module_name, feature) = match name.split_once(':') {
                    Some((p, f)) => {
                        let m = env.prefixes.get(p).ok_or_else(|| {
                            Error::not_found(format!("unknown prefix \"{p}\" in if-feature"))
                        })?;
                        (m.clone(), f)
                    }
                    None => (self.interner.intern(env.def.name()), name),
                };
                let module_id = self.set.find_module(&module_name).ok_or_else(|| {
                    Error::not_found(format!("unknown module \"{module_name}\" in if-feature"))
                })?;
                if !self
                    .set
                    .module(module_id)
                    .features
                    .iter()
                    .any(|f| &**f == feature)
                {
                    return Err(Error::not_found(format!(
                        "feature \"{feature}\" not defined in module \"{module_name}\""
                    )));
                }
                Ok(self
                    .enabled
                    .contains(&(module_name.clone(), self.interner.intern(feature))))
            }
            None => Err(Error::syntax("empty if-feature expression")),
        }
    }

    // ==================================================================
    // Types
    // ==================================================================

    fn resolve_identity_name(
        &mut self,
        arg: &str,
        prefixes: &PrefixMap,
        own_module: ModuleId,
    ) -> Result<IdentityId> {
        let (module_id, name) = match arg.split_once(':') {
            Some((p, n)) => {
                let module_name = prefixes.get(p).ok_or_else(|| {
                    Error::not_found(format!("unknown prefix \"{p}\" in base \"{arg}\""))
                })?;
                let id = self.set.find_module(module_name).ok_or_else(|| {
                    Error::not_found(format!("module \"{module_name}\" not compiled"))
                })?;
                (id, n)
            }
            None => (own_module, arg),
        };
        self.set
            .find_identity(module_id, name)
            .ok_or_else(|| Error::not_found(format!("identity \"{arg}\" not found")))
    }

    /// Compile a `type` statement down to a built-in, applying restrictions
    /// along the typedef chain.
    fn compile_type(
        &mut self,
        type_stmt: &'a Statement,
        env: &ModEnv<'a>,
        chain: &mut Vec<(IStr, IStr)>,
    ) -> Result<ResolvedType> {
        let type_name = type_stmt.arg().to_string();

        // Built-in base?
        if let Some(kind) = self.builtin_kind(&type_name, type_stmt, env, chain)? {
            return Ok(ResolvedType { kind, default: None, units: None, typedef: None });
        }

        // A typedef: local scope chain for unprefixed names, another
        // module's top level for prefixed ones.
        let (td_stmt, td_env) = self.find_typedef(&type_name, env)?;
        let chain_key = (
            self.interner.intern(td_env.def.name()),
            self.interner.intern(td_stmt.arg()),
        );
        if chain.contains(&chain_key) {
            return Err(Error::semantic(format!(
                "typedef cycle through \"{type_name}\""
            )));
        }
        chain.push(chain_key);
        let inner_type = td_stmt
            .find(Keyword::Type)
            .ok_or_else(|| Error::semantic(format!("typedef \"{type_name}\" has no type")))?;
        let mut resolved = self.compile_type(inner_type, &td_env, chain)?;
        chain.pop();

        // The typedef's own default/units, unless overridden further out.
        if let Some(d) = td_stmt.arg_of(Keyword::Default) {
            resolved.default = Some(self.interner.intern(d));
        }
        if let Some(u) = td_stmt.arg_of(Keyword::Units) {
            resolved.units = Some(self.interner.intern(u));
        }
        resolved.typedef = Some(self.interner.intern(td_stmt.arg()));

        // Restrictions written on the referencing `type` statement.
        resolved.kind = self.restrict_kind(resolved.kind, type_stmt, env)?;
        Ok(resolved)
    }

    /// Compile a built-in type name with its restriction substatements, or
    /// `None` if the name is not a built-in.
    fn builtin_kind(
        &mut self,
        name: &str,
        ts: &'a Statement,
        env: &ModEnv<'a>,
        chain: &mut Vec<(IStr, IStr)>,
    ) -> Result<Option<TypeKind>> {
        let kind = match name {
            _ if IntKind::from_name(name).is_some() => {
                let int = IntKind::from_name(name).unwrap();
                ensure_substmts(ts, &[Keyword::Range])?;
                let mut ranges = vec![int.domain()];
                if let Some(r) = ts.arg_of(Keyword::Range) {
                    ranges = restrict_ranges(&ranges, r, None)?;
                }
                TypeKind::Int { int, ranges }
            }
            "decimal64" => {
                ensure_substmts(ts, &[Keyword::Range, Keyword::FractionDigits])?;
                let fd: u8 = ts
                    .arg_of(Keyword::FractionDigits)
                    .ok_or_else(|| Error::semantic("decimal64 requires fraction-digits"))?
                    .parse()
                    .map_err(|_| Error::syntax("invalid fraction-digits"))?;
                if !(1..=18).contains(&fd) {
                    return Err(Error::value("fraction-digits must be 1..18"));
                }
                let mut ranges = vec![decimal64_domain()];
                if let Some(r) = ts.arg_of(Keyword::Range) {
                    ranges = restrict_ranges(&ranges, r, Some(fd))?;
                }
                TypeKind::Decimal64 { fraction_digits: fd, ranges }
            }
            "string" => {
                ensure_substmts(ts, &[Keyword::Length, Keyword::Pattern])?;
                let mut length = vec![length_domain()];
                if let Some(l) = ts.arg_of(Keyword::Length) {
                    length = restrict_ranges(&length, l, None)?;
                }
                let patterns = self.compile_patterns(ts)?;
                TypeKind::String { length, patterns }
            }
            "boolean" => {
                ensure_substmts(ts, &[])?;
                TypeKind::Boolean
            }
            "empty" => {
                ensure_substmts(ts, &[])?;
                TypeKind::Empty
            }
            "binary" => {
                ensure_substmts(ts, &[Keyword::Length])?;
                let mut length = vec![length_domain()];
                if let Some(l) = ts.arg_of(Keyword::Length) {
                    length = restrict_ranges(&length, l, None)?;
                }
                TypeKind::Binary { length }
            }
            "enumeration" => {
                ensure_substmts(ts, &[Keyword::Enum])?;
                TypeKind::Enumeration { enums: self.compile_enums(ts, env)? }
            }
            "bits" => {
                ensure_substmts(ts, &[Keyword::Bit])?;
                TypeKind::Bits { bits: self.compile_bits(ts, env)? }
            }
            "identityref" => {
                ensure_substmts(ts, &[Keyword::Base])?;
                let mut bases = Vec::new();
                for base in ts.find_all(Keyword::Base) {
                    bases.push(self.resolve_identity_name(
                        base.arg(),
                        &env.prefixes,
                        env.def_id,
                    )?);
                }
                if bases.is_empty() {
                    return Err(Error::semantic("identityref requires a base"));
                }
                TypeKind::IdentityRef { bases }
            }
            "instance-identifier" => {
                ensure_substmts(ts, &[Keyword::RequireInstance])?;
                TypeKind::InstanceIdentifier {
                    require_instance: parse_require_instance(ts)?,
                }
            }
            "leafref" => {
                ensure_substmts(ts, &[Keyword::Path, Keyword::RequireInstance])?;
                let path_arg = ts
                    .arg_of(Keyword::Path)
                    .ok_or_else(|| Error::semantic("leafref requires a path"))?;
                let path = parse_xpath(self.interner, path_arg)?;
                TypeKind::LeafRef {
                    path,
                    prefixes: Arc::clone(&env.prefixes),
                    require_instance: parse_require_instance(ts)?,
                    target: None,
                    realtype: None,
                }
            }
            "union" => {
                ensure_substmts(ts, &[Keyword::Type])?;
                let member_stmts: Vec<&'a Statement> = ts.find_all(Keyword::Type).collect();
                if member_stmts.is_empty() {
                    return Err(Error::semantic("union requires at least one member type"));
                }
                let mut members = Vec::new();
                for m in member_stmts {
                    let resolved = self.compile_type(m, env, chain)?;
                    members.push(CompiledType { typedef: resolved.typedef, kind: resolved.kind });
                }
                TypeKind::Union { members }
            }
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    /// Apply the restrictions of a derived `type` statement onto the kind
    /// resolved from its typedef.
    fn restrict_kind(
        &mut self,
        kind: TypeKind,
        ts: &'a Statement,
        env: &ModEnv<'a>,
    ) -> Result<TypeKind> {
        Ok(match kind {
            TypeKind::Int { int, ranges } => {
                ensure_substmts(ts, &[Keyword::Range])?;
                let ranges = match ts.arg_of(Keyword::Range) {
                    Some(r) => restrict_ranges(&ranges, r, None)?,
                    None => ranges,
                };
                TypeKind::Int { int, ranges }
            }
            TypeKind::Decimal64 { fraction_digits, ranges } => {
                // fraction-digits is fixed at the first decimal64 level.
                ensure_substmts(ts, &[Keyword::Range])?;
                let ranges = match ts.arg_of(Keyword::Range) {
                    Some(r) => restrict_ranges(&ranges, r, Some(fraction_digits))?,
                    None => ranges,
                };
                TypeKind::Decimal64 { fraction_digits, ranges }
            }
            TypeKind::String { length, mut patterns } => {
                ensure_substmts(ts, &[Keyword::Length, Keyword::Pattern])?;
                let length = match ts.arg_of(Keyword::Length) {
                    Some(l) => restrict_ranges(&length, l, None)?,
                    None => length,
                };
                patterns.extend(self.compile_patterns(ts)?);
                TypeKind::String { length, patterns }
            }
            TypeKind::Binary { length } => {
                ensure_substmts(ts, &[Keyword::Length])?;
                let length = match ts.arg_of(Keyword::Length) {
                    Some(l) => restrict_ranges(&length, l, None)?,
                    None => length,
                };
                TypeKind::Binary { length }
            }
            TypeKind::Enumeration { enums } => {
                ensure_substmts(ts, &[Keyword::Enum])?;
                let subset: Vec<&'a Statement> = ts.find_all(Keyword::Enum).collect();
                if subset.is_empty() {
                    TypeKind::Enumeration { enums }
                } else {
                    let mut restricted = Vec::new();
                    for e in subset {
                        let found = enums.iter().find(|have| &*have.name == e.arg());
                        match found {
                            Some(have) => restricted.push(have.clone()),
                            None => {
                                return Err(Error::value(format!(
                                    "enum \"{}\" is not in the base enumeration",
                                    e.arg()
                                )));
                            }
                        }
                    }
                    TypeKind::Enumeration { enums: restricted }
                }
            }
            TypeKind::Bits { bits } => {
                ensure_substmts(ts, &[Keyword::Bit])?;
                let subset: Vec<&'a Statement> = ts.find_all(Keyword::Bit).collect();
                if subset.is_empty() {
                    TypeKind::Bits { bits }
                } else {
                    let mut restricted = Vec::new();
                    for b in subset {
                        let found = bits.iter().find(|have| &*have.name == b.arg());
                        match found {
                            Some(have) => restricted.push(have.clone()),
                            None => {
                                return Err(Error::value(format!(
                                    "bit \"{}\" is not in the base bits type",
                                    b.arg()
                                )));
                            }
                        }
                    }
                    TypeKind::Bits { bits: restricted }
                }
            }
            TypeKind::IdentityRef { mut bases } => {
                ensure_substmts(ts, &[Keyword::Base])?;
                for base in ts.find_all(Keyword::Base) {
                    bases.push(self.resolve_identity_name(
                        base.arg(),
                        &env.prefixes,
                        env.def_id,
                    )?);
                }
                TypeKind::IdentityRef { bases }
            }
            TypeKind::InstanceIdentifier { require_instance } => {
                ensure_substmts(ts, &[Keyword::RequireInstance])?;
                let require_instance = if ts.has(Keyword::RequireInstance) {
                    parse_require_instance(ts)?
                } else {
                    require_instance
                };
                TypeKind::InstanceIdentifier { require_instance }
            }
            TypeKind::LeafRef { path, prefixes, require_instance, target, realtype } => {
                ensure_substmts(ts, &[Keyword::RequireInstance])?;
                let require_instance = if ts.has(Keyword::RequireInstance) {
                    parse_require_instance(ts)?
                } else {
                    require_instance
                };
                TypeKind::LeafRef { path, prefixes, require_instance, target, realtype }
            }
            TypeKind::Boolean | TypeKind::Empty | TypeKind::Union { .. } => {
                ensure_substmts(ts, &[])?;
                kind
            }
        })
    }

    fn compile_patterns(&mut self, ts: &'a Statement) -> Result<Vec<Pattern>> {
        let mut patterns = Vec::new();
        for p in ts.find_all(Keyword::Pattern) {
            let invert = p.arg_of(Keyword::Modifier) == Some("invert-match");
            patterns.push(Pattern {
                regex: compile_pattern(p.arg())?,
                text: self.interner.intern(p.arg()),
                invert,
                error_message: p
                    .arg_of(Keyword::ErrorMessage)
                    .map(|m| self.interner.intern(m)),
                error_app_tag: p
                    .arg_of(Keyword::ErrorAppTag)
                    .map(|m| self.interner.intern(m)),
            });
        }
        Ok(patterns)
    }

    fn compile_enums(&mut self, ts: &'a Statement, env: &ModEnv<'a>) -> Result<Vec<EnumSpec>> {
        let mut enums: Vec<EnumSpec> = Vec::new();
        let mut next: i64 = 0;
        for e in ts.find_all(Keyword::Enum) {
            if !self.if_features_enabled(e, env)? {
                continue;
            }
            let name = e.arg();
            if name.is_empty() || name.trim() != name {
                return Err(Error::value(format!("invalid enum name \"{name}\"")));
            }
            if enums.iter().any(|have| &*have.name == name) {
                return Err(Error::duplicate(format!("enum \"{name}\" defined twice")));
            }
            let value: i64 = match e.arg_of(Keyword::Value) {
                Some(v) => v
                    .parse::<i32>()
                    .map_err(|_| Error::value(format!("invalid enum value \"{v}\"")))?
                    as i64,
                None => {
                    if next > i32::MAX as i64 {
                        return Err(Error::value("enum value overflow"));
                    }
                    next
                }
            };
            if enums.iter().any(|have| have.value as i64 == value) {
                return Err(Error::duplicate(format!("enum value {value} assigned twice")));
            }
            next = value + 1;
            enums.push(EnumSpec { name: self.interner.intern(name), value: value as i32 });
        }
        if enums.is_empty() {
            return Err(Error::semantic("enumeration must define at least one enum"));
        }
        Ok(enums)
    }

    fn compile_bits(&mut self, ts: &'a Statement, env: &ModEnv<'a>) -> Result<Vec<BitSpec>> {
        let mut bits: Vec<BitSpec> = Vec::new();
        let mut next: u64 = 0;
        for b in ts.find_all(Keyword::Bit) {
            if !self.if_features_enabled(b, env)? {
                continue;
            }
            let name = b.arg();
            if bits.iter().any(|have| &*have.name == name) {
                return Err(Error::duplicate(format!("bit \"{name}\" defined twice")));
            }
            let position: u64 = match b.arg_of(Keyword::Position) {
                Some(v) => v
                    .parse::<u32>()
                    .map_err(|_| Error::value(format!("invalid bit position \"{v}\"")))?
                    as u64,
                None => {
                    if next > u32::MAX as u64 {
                        return Err(Error::value("bit position overflow"));
                    }
                    next
                }
            };
            if bits.iter().any(|have| have.position as u64 == position) {
                return Err(Error::duplicate(format!(
                    "bit position {position} assigned twice"
                )));
            }
            next = position + 1;
            bits.push(BitSpec { name: self.interner.intern(name), position: position as u32 });
        }
        if bits.is_empty() {
            return Err(Error::semantic("bits must define at least one bit"));
        }
        Ok(bits)
    }

    fn find_typedef(
        &self,
        name: &str,
        env: &ModEnv<'a>,
    ) -> Result<(&'a Statement, ModEnv<'a>)> {
        if let Some((prefix, local)) = name.split_once(':') {
            let module_name = env
                .prefixes
                .get(prefix)
                .ok_or_else(|| Error::not_found(format!("unknown prefix \"{prefix}\"")))?
                .clone();
            if &*module_name != env.def.name() {
                let entry = self.parsed.get(&*module_name).ok_or_else(|| {
                    Error::not_found(format!("module \"{module_name}\" is not loaded"))
                })?;
                let pm: &'a ParsedModule = &entry.module;
                let td = pm
                    .root()
                    .find_all(Keyword::Typedef)
                    .find(|t| t.arg() == local)
                    .ok_or_else(|| {
                        Error::not_found(format!("typedef \"{name}\" not found"))
                    })?;
                let def_id = *self.compiled.get(&*module_name).ok_or_else(|| {
                    Error::Internal(format!("module \"{module_name}\" not compiled"))
                })?;
                let tenv = ModEnv {
                    target: env.target,
                    def: pm,
                    def_id,
                    prefixes: Arc::clone(&self.set.module(def_id).prefixes),
                    scopes: vec![pm.root()],
                };
                return Ok((td, tenv));
            }
            // Own prefix: fall through to the local search with the bare name.
            return self.find_typedef(local, env);
        }

        // Innermost scope first.
        for (i, scope) in env.scopes.iter().enumerate().rev() {
            if let Some(td) = scope.find_all(Keyword::Typedef).find(|t| t.arg() == name) {
                let mut tenv = env.clone();
                tenv.scopes.truncate(i + 1);
                return Ok((td, tenv));
            }
        }
        Err(Error::not_found(format!("typedef \"{name}\" not found")))
    }

    // ==================================================================
    // Data nodes
    // ==================================================================

    fn compile_data_node(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<Option<SnodeId>> {
        if !self.if_features_enabled(stmt, env)? {
            return Ok(None);
        }
        match stmt.keyword {
            Keyword::Container => self.compile_container(stmt, env, parent, inherit).map(Some),
            Keyword::Leaf => self.compile_leaf(stmt, env, parent, inherit).map(Some),
            Keyword::LeafList => self.compile_leaf_list(stmt, env, parent, inherit).map(Some),
            Keyword::List => self.compile_list(stmt, env, parent, inherit).map(Some),
            Keyword::Choice => self.compile_choice(stmt, env, parent, inherit).map(Some),
            Keyword::Case => self.compile_case(stmt, env, parent, inherit).map(Some),
            Keyword::Anydata | Keyword::Anyxml => {
                self.compile_any(stmt, env, parent, inherit).map(Some)
            }
            Keyword::Uses => {
                self.expand_uses(stmt, env, parent, inherit)?;
                Ok(None)
            }
            _ => Err(Error::Internal(format!(
                "unexpected data definition \"{}\"",
                stmt.keyword
            ))),
        }
    }

    /// Shared base-field compilation: flags, status, when/must, description.
    fn new_node(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
        kind: SnodeKind,
    ) -> Result<SchemaNode> {
        let status = child_status(stmt, inherit.status)?;
        let mut flags = SchemaFlags::empty();

        let config = match stmt.arg_of(Keyword::Config) {
            Some("true") => {
                if !inherit.config && !inherit.operation {
                    return Err(Error::semantic_at(
                        format!(
                            "node \"{}\" cannot be config true under a config false parent",
                            stmt.arg()
                        ),
                        stmt.pos,
                    ));
                }
                true
            }
            Some("false") => false,
            Some(other) => {
                return Err(Error::syntax_at(format!("invalid config \"{other}\""), stmt.pos));
            }
            None => inherit.config,
        };
        if config && !inherit.operation {
            flags |= SchemaFlags::CONFIG;
        }
        if stmt.arg_of(Keyword::Mandatory) == Some("true") {
            flags |= SchemaFlags::MANDATORY;
        }
        if stmt.arg_of(Keyword::OrderedBy) == Some("user") {
            flags |= SchemaFlags::USER_ORDERED;
        }

        let when = match stmt.find(Keyword::When) {
            Some(w) => Some(WhenCond {
                expr: parse_xpath(self.interner, w.arg())?,
                prefixes: Arc::clone(&env.prefixes),
            }),
            None => None,
        };
        let mut musts = Vec::new();
        for m in stmt.find_all(Keyword::Must) {
            musts.push(MustCond {
                expr: parse_xpath(self.interner, m.arg())?,
                prefixes: Arc::clone(&env.prefixes),
                error_message: m.arg_of(Keyword::ErrorMessage).map(|s| self.interner.intern(s)),
                error_app_tag: m.arg_of(Keyword::ErrorAppTag).map(|s| self.interner.intern(s)),
            });
        }

        Ok(SchemaNode {
            module: env.target,
            parent,
            name: self.interner.intern(stmt.arg()),
            kind,
            flags,
            status,
            description: stmt.arg_of(Keyword::Description).map(|s| self.interner.intern(s)),
            reference: stmt.arg_of(Keyword::Reference).map(|s| self.interner.intern(s)),
            when,
            musts,
            children: Vec::new(),
        })
    }

    fn child_inherit(&self, node: SnodeId, inherit: Inherit) -> Inherit {
        let n = self.set.node(node);
        Inherit {
            config: n.is_config(),
            status: n.status,
            operation: inherit.operation,
        }
    }

    fn compile_children_into(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        id: SnodeId,
        inherit: Inherit,
    ) -> Result<()> {
        let mut env = env.clone();
        env.scopes.push(stmt);
        let inherit = self.child_inherit(id, inherit);
        for child in data_def_stmts(stmt) {
            if let Some(cid) = self.compile_data_node(child, &env, Some(id), inherit)? {
                self.set.node_mut(id).children.push(cid);
            }
        }
        for action in stmt.find_all(Keyword::Action) {
            if let Some(aid) = self.compile_operation(action, &env, Some(id), SnodeKind::Action)? {
                self.set.node_mut(id).children.push(aid);
            }
        }
        for notif in stmt.find_all(Keyword::Notification) {
            if let Some(nid) = self.compile_notification(notif, &env, Some(id))? {
                self.set.node_mut(id).children.push(nid);
            }
        }
        Ok(())
    }

    fn compile_container(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let presence = stmt.has(Keyword::Presence);
        let mut node =
            self.new_node(stmt, env, parent, inherit, SnodeKind::Container { presence })?;
        if presence {
            node.flags |= SchemaFlags::PRESENCE;
        }
        let id = self.set.push_node(node);
        self.compile_children_into(stmt, env, id, inherit)?;
        Ok(id)
    }

    fn compile_leaf(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let type_stmt = stmt
            .find(Keyword::Type)
            .ok_or_else(|| Error::semantic_at("leaf requires a type", stmt.pos))?;
        let resolved = self.compile_type(type_stmt, env, &mut Vec::new())?;
        let units = stmt
            .arg_of(Keyword::Units)
            .map(|u| self.interner.intern(u))
            .or(resolved.units);
        let default_raw = stmt
            .arg_of(Keyword::Default)
            .map(|d| self.interner.intern(d))
            .or(resolved.default.clone());

        let node = self.new_node(
            stmt,
            env,
            parent,
            inherit,
            SnodeKind::Leaf {
                typ: CompiledType { typedef: resolved.typedef, kind: resolved.kind },
                default: None,
                units,
            },
        )?;
        if node.is_mandatory() && default_raw.is_some() && stmt.has(Keyword::Default) {
            return Err(Error::semantic_at(
                format!("leaf \"{}\" is mandatory and has a default", stmt.arg()),
                stmt.pos,
            ));
        }
        let id = self.set.push_node(node);
        if let Some(raw) = default_raw {
            if !self.set.node(id).is_mandatory() {
                self.raw_defaults.push((id, raw, Arc::clone(&env.prefixes)));
            }
        }
        Ok(id)
    }

    fn compile_leaf_list(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let type_stmt = stmt
            .find(Keyword::Type)
            .ok_or_else(|| Error::semantic_at("leaf-list requires a type", stmt.pos))?;
        let resolved = self.compile_type(type_stmt, env, &mut Vec::new())?;
        let units = stmt
            .arg_of(Keyword::Units)
            .map(|u| self.interner.intern(u))
            .or(resolved.units);
        let (min_elements, max_elements) = parse_min_max(stmt)?;

        let own_defaults: Vec<IStr> = stmt
            .find_all(Keyword::Default)
            .map(|d| self.interner.intern(d.arg()))
            .collect();
        let defaults_raw: Vec<IStr> = if own_defaults.is_empty() {
            resolved.default.clone().into_iter().collect()
        } else {
            own_defaults
        };
        if !defaults_raw.is_empty() && min_elements > 0 {
            return Err(Error::semantic_at(
                format!(
                    "leaf-list \"{}\" has defaults but min-elements > 0",
                    stmt.arg()
                ),
                stmt.pos,
            ));
        }

        let node = self.new_node(
            stmt,
            env,
            parent,
            inherit,
            SnodeKind::LeafList {
                typ: CompiledType { typedef: resolved.typedef, kind: resolved.kind },
                defaults: Vec::new(),
                units,
                min_elements,
                max_elements,
            },
        )?;
        let id = self.set.push_node(node);
        for raw in defaults_raw {
            self.raw_defaults.push((id, raw, Arc::clone(&env.prefixes)));
        }
        Ok(id)
    }

    fn compile_list(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let (min_elements, max_elements) = parse_min_max(stmt)?;
        let node = self.new_node(
            stmt,
            env,
            parent,
            inherit,
            SnodeKind::List {
                keys: Vec::new(),
                uniques: Vec::new(),
                min_elements,
                max_elements,
            },
        )?;
        let id = self.set.push_node(node);
        self.compile_children_into(stmt, env, id, inherit)?;

        // Keys: direct leaf children, marked mandatory.
        let mut keys = Vec::new();
        if let Some(key_arg) = stmt.arg_of(Keyword::Key) {
            for key_name in key_arg.split_whitespace() {
                let children = self.set.node(id).children.clone();
                let key_id = children
                    .iter()
                    .copied()
                    .find(|&c| {
                        let n = self.set.node(c);
                        matches!(n.kind, SnodeKind::Leaf { .. }) && &*n.name == key_name
                    })
                    .ok_or_else(|| {
                        Error::not_found(format!(
                            "key leaf \"{key_name}\" not found in list \"{}\"",
                            stmt.arg()
                        ))
                    })?;
                if keys.contains(&key_id) {
                    return Err(Error::duplicate(format!("duplicate key \"{key_name}\"")));
                }
                let key_node = self.set.node_mut(key_id);
                key_node.flags |= SchemaFlags::KEY | SchemaFlags::MANDATORY;
                if key_node.when.is_some() {
                    return Err(Error::semantic(format!(
                        "key leaf \"{key_name}\" cannot have a when condition"
                    )));
                }
                keys.push(key_id);
            }
        } else if self.set.node(id).is_config() {
            return Err(Error::semantic_at(
                format!("config true list \"{}\" requires a key", stmt.arg()),
                stmt.pos,
            ));
        }

        // Unique tuples: descendant leaves by schema path.
        let mut uniques = Vec::new();
        for u in stmt.find_all(Keyword::Unique) {
            let mut leaves = Vec::new();
            for path in u.arg().split_whitespace() {
                let leaf = self.resolve_descendant(id, path, env)?;
                if !matches!(self.set.node(leaf).kind, SnodeKind::Leaf { .. }) {
                    return Err(Error::semantic(format!(
                        "unique component \"{path}\" is not a leaf"
                    )));
                }
                leaves.push(leaf);
            }
            uniques.push(Unique { leaves, text: self.interner.intern(u.arg()) });
        }

        if let SnodeKind::List { keys: k, uniques: uq, .. } = &mut self.set.node_mut(id).kind {
            *k = keys;
            *uq = uniques;
        }
        Ok(id)
    }

    fn compile_choice(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let node =
            self.new_node(stmt, env, parent, inherit, SnodeKind::Choice { default_case: None })?;
        if node.is_mandatory() && stmt.has(Keyword::Default) {
            return Err(Error::semantic_at(
                format!("choice \"{}\" is mandatory and has a default", stmt.arg()),
                stmt.pos,
            ));
        }
        let id = self.set.push_node(node);
        let child_inherit = self.child_inherit(id, inherit);
        let mut env2 = env.clone();
        env2.scopes.push(stmt);
        for child in stmt.children.iter() {
            let cid = match child.keyword {
                Keyword::Case => self.compile_case(child, &env2, Some(id), child_inherit)?,
                // Shorthand: a data node directly under choice gets an
                // implicit case of the same name.
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Anydata
                | Keyword::Anyxml => {
                    if !self.if_features_enabled(child, &env2)? {
                        continue;
                    }
                    let case = SchemaNode {
                        module: env2.target,
                        parent: Some(id),
                        name: self.interner.intern(child.arg()),
                        kind: SnodeKind::Case,
                        flags: self.set.node(id).flags & SchemaFlags::CONFIG,
                        status: self.set.node(id).status,
                        description: None,
                        reference: None,
                        when: None,
                        musts: Vec::new(),
                        children: Vec::new(),
                    };
                    let case_id = self.set.push_node(case);
                    if let Some(inner) =
                        self.compile_data_node(child, &env2, Some(case_id), child_inherit)?
                    {
                        self.set.node_mut(case_id).children.push(inner);
                    }
                    case_id
                }
                _ => continue,
            };
            self.set.node_mut(id).children.push(cid);
        }
        if let Some(default_name) = stmt.arg_of(Keyword::Default) {
            self.raw_choice_defaults.push((id, self.interner.intern(default_name)));
        }
        Ok(id)
    }

    fn compile_case(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let node = self.new_node(stmt, env, parent, inherit, SnodeKind::Case)?;
        let id = self.set.push_node(node);
        self.compile_children_into(stmt, env, id, inherit)?;
        Ok(id)
    }

    fn compile_any(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<SnodeId> {
        let kind = if stmt.keyword == Keyword::Anydata {
            SnodeKind::AnyData
        } else {
            SnodeKind::AnyXml
        };
        let node = self.new_node(stmt, env, parent, inherit, kind)?;
        Ok(self.set.push_node(node))
    }

    fn compile_operation(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        kind: SnodeKind,
    ) -> Result<Option<SnodeId>> {
        if !self.if_features_enabled(stmt, env)? {
            return Ok(None);
        }
        let inherit = Inherit { config: true, status: Status::Current, operation: true };
        let node = self.new_node(stmt, env, parent, inherit, kind)?;
        let id = self.set.push_node(node);

        let mut env2 = env.clone();
        env2.scopes.push(stmt);

        // input and output always exist, even when implicit.
        for (kw, io_kind, io_name) in [
            (Keyword::Input, SnodeKind::Input, "input"),
            (Keyword::Output, SnodeKind::Output, "output"),
        ] {
            let io = SchemaNode {
                module: env.target,
                parent: Some(id),
                name: self.interner.intern(io_name),
                kind: io_kind,
                flags: SchemaFlags::empty(),
                status: self.set.node(id).status,
                description: None,
                reference: None,
                when: None,
                musts: Vec::new(),
                children: Vec::new(),
            };
            let io_id = self.set.push_node(io);
            if let Some(io_stmt) = stmt.find(kw) {
                let mut io_env = env2.clone();
                io_env.scopes.push(io_stmt);
                for m in io_stmt.find_all(Keyword::Must) {
                    let must = MustCond {
                        expr: parse_xpath(self.interner, m.arg())?,
                        prefixes: Arc::clone(&env.prefixes),
                        error_message: m
                            .arg_of(Keyword::ErrorMessage)
                            .map(|s| self.interner.intern(s)),
                        error_app_tag: m
                            .arg_of(Keyword::ErrorAppTag)
                            .map(|s| self.interner.intern(s)),
                    };
                    self.set.node_mut(io_id).musts.push(must);
                }
                for child in data_def_stmts(io_stmt) {
                    if let Some(cid) =
                        self.compile_data_node(child, &io_env, Some(io_id), inherit)?
                    {
                        self.set.node_mut(io_id).children.push(cid);
                    }
                }
            }
            self.set.node_mut(id).children.push(io_id);
        }
        Ok(Some(id))
    }

    fn compile_notification(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
    ) -> Result<Option<SnodeId>> {
        if !self.if_features_enabled(stmt, env)? {
            return Ok(None);
        }
        let inherit = Inherit { config: true, status: Status::Current, operation: true };
        let node = self.new_node(stmt, env, parent, inherit, SnodeKind::Notification)?;
        let id = self.set.push_node(node);
        self.compile_children_into(stmt, env, id, inherit)?;
        Ok(Some(id))
    }

    // ==================================================================
    // uses / refine / uses-augment
    // ==================================================================

    fn expand_uses(
        &mut self,
        stmt: &'a Statement,
        env: &ModEnv<'a>,
        parent: Option<SnodeId>,
        inherit: Inherit,
    ) -> Result<()> {
        let (grouping, genv) = self.find_grouping(stmt.arg(), env)?;
        let cycle_key = (
            self.interner.intern(genv.def.name()),
            self.interner.intern(grouping.arg()),
        );
        if self.uses_stack.contains(&cycle_key) {
            return Err(Error::semantic_at(
                format!("grouping cycle through \"{}\"", stmt.arg()),
                stmt.pos,
            ));
        }
        self.uses_stack.push(cycle_key);
        trace!(grouping = %stmt.arg(), "expanding uses");

        let mut genv = genv;
        genv.scopes.push(grouping);
        let mut created = Vec::new();
        for child in data_def_stmts(grouping) {
            if let Some(cid) = self.compile_data_node(child, &genv, parent, inherit)? {
                created.push(cid);
                match parent {
                    Some(p) => self.set.node_mut(p).children.push(cid),
                    None => self.set.module_mut(env.target).children.push(cid),
                }
            }
        }
        for action in grouping.find_all(Keyword::Action) {
            if let Some(aid) = self.compile_operation(action, &genv, parent, SnodeKind::Action)? {
                created.push(aid);
                match parent {
                    Some(p) => self.set.node_mut(p).children.push(aid),
                    None => self.set.module_mut(env.target).rpcs.push(aid),
                }
            }
        }
        for notif in grouping.find_all(Keyword::Notification) {
            if let Some(nid) = self.compile_notification(notif, &genv, parent)? {
                created.push(nid);
                match parent {
                    Some(p) => self.set.node_mut(p).children.push(nid),
                    None => self.set.module_mut(env.target).notifications.push(nid),
                }
            }
        }
        self.uses_stack.pop();

        // A when on the uses applies to every instantiated top-level node.
        if let Some(w) = stmt.find(Keyword::When) {
            let when = WhenCond {
                expr: parse_xpath(self.interner, w.arg())?,
                prefixes: Arc::clone(&env.prefixes),
            };
            for &id in &created {
                if self.set.node(id).when.is_none() {
                    self.set.node_mut(id).when = Some(when.clone());
                }
            }
        }

        // refine statements.
        for refine in stmt.find_all(Keyword::Refine) {
            let target = self.resolve_in_created(&created, refine.arg())?;
            self.apply_refine(target, refine, env)?;
        }

        // uses-augment: relative targets inside the expanded subtree.
        for aug in stmt.find_all(Keyword::Augment) {
            let target = self.resolve_in_created(&created, aug.arg())?;
            self.apply_augment_children(aug, env, target)?;
        }
        Ok(())
    }

    fn find_grouping(&self, name: &str, env: &ModEnv<'a>) -> Result<(&'a Statement, ModEnv<'a>)> {
        if let Some((prefix, local)) = name.split_once(':') {
            let module_name = env
                .prefixes
                .get(prefix)
                .ok_or_else(|| Error::not_found(format!("unknown prefix \"{prefix}\"")))?
                .clone();
            if &*module_name != env.def.name() {
                let entry = self.parsed.get(&*module_name).ok_or_else(|| {
                    Error::not_found(format!("module \"{module_name}\" is not loaded"))
                })?;
                let pm: &'a ParsedModule = &entry.module;
                let g = pm
                    .root()
                    .find_all(Keyword::Grouping)
                    .find(|g| g.arg() == local)
                    .ok_or_else(|| {
                        Error::not_found(format!("grouping \"{name}\" not found"))
                    })?;
                let def_id = *self.compiled.get(&*module_name).ok_or_else(|| {
                    Error::Internal(format!("module \"{module_name}\" not compiled"))
                })?;
                let genv = ModEnv {
                    target: env.target,
                    def: pm,
                    def_id,
                    prefixes: Arc::clone(&self.set.module(def_id).prefixes),
                    scopes: vec![pm.root()],
                };
                return Ok((g, genv));
            }
            return self.find_grouping(local, env);
        }
        for (i, scope) in env.scopes.iter().enumerate().rev() {
            if let Some(g) = scope.find_all(Keyword::Grouping).find(|g| g.arg() == name) {
                let mut genv = env.clone();
                genv.scopes.truncate(i + 1);
                return Ok((g, genv));
            }
        }
        Err(Error::not_found(format!("grouping \"{name}\" not found")))
    }

    /// Resolve a relative descendant path among freshly created nodes.
    fn resolve_in_created(&self, created: &[SnodeId], path: &str) -> Result<SnodeId> {
        let mut current: Option<SnodeId> = None;
        let mut candidates: Vec<SnodeId> = created.to_vec();
        for segment in path.split('/') {
            let name = segment.rsplit_once(':').map(|(_, n)| n).unwrap_or(segment);
            let found = candidates
                .iter()
                .copied()
                .find(|&c| &*self.set.node(c).name == name)
                .ok_or_else(|| {
                    Error::not_found(format!("refine/augment target \"{path}\" not found"))
                })?;
            current = Some(found);
            candidates = self.set.node(found).children.clone();
        }
        current.ok_or_else(|| Error::not_found(format!("empty target path \"{path}\"")))
    }

    fn apply_refine(
        &mut self,
        target: SnodeId,
        refine: &'a Statement,
        env: &ModEnv<'a>,
    ) -> Result<()> {
        if let Some(d) = refine.arg_of(Keyword::Description) {
            let d = self.interner.intern(d);
            self.set.node_mut(target).description = Some(d);
        }
        if let Some(r) = refine.arg_of(Keyword::Reference) {
            let r = self.interner.intern(r);
            self.set.node_mut(target).reference = Some(r);
        }
        if let Some(c) = refine.arg_of(Keyword::Config) {
            let node = self.set.node_mut(target);
            match c {
                "true" => node.flags |= SchemaFlags::CONFIG,
                "false" => node.flags -= SchemaFlags::CONFIG,
                _ => return Err(Error::syntax("invalid config in refine")),
            }
            // Propagate down the refined subtree.
            let config = self.set.node(target).is_config();
            for id in self.set.traverse(target) {
                if config {
                    self.set.node_mut(id).flags |= SchemaFlags::CONFIG;
                } else {
                    self.set.node_mut(id).flags -= SchemaFlags::CONFIG;
                }
            }
        }
        if let Some(m) = refine.arg_of(Keyword::Mandatory) {
            let node = self.set.node_mut(target);
            match m {
                "true" => node.flags |= SchemaFlags::MANDATORY,
                "false" => node.flags -= SchemaFlags::MANDATORY,
                _ => return Err(Error::syntax("invalid mandatory in refine")),
            }
        }
        if refine.has(Keyword::Presence) {
            let node = self.set.node_mut(target);
            if let SnodeKind::Container { presence } = &mut node.kind {
                *presence = true;
                node.flags |= SchemaFlags::PRESENCE;
            } else {
                return Err(Error::semantic("refine presence on a non-container"));
            }
        }
        if refine.has(Keyword::Default) {
            let defaults: Vec<IStr> = refine
                .find_all(Keyword::Default)
                .map(|d| self.interner.intern(d.arg()))
                .collect();
            match &self.set.node(target).kind {
                SnodeKind::Leaf { .. } => {
                    self.raw_defaults.retain(|(id, _, _)| *id != target);
                    self.raw_defaults.push((
                        target,
                        defaults[0].clone(),
                        Arc::clone(&env.prefixes),
                    ));
                }
                SnodeKind::LeafList { .. } => {
                    self.raw_defaults.retain(|(id, _, _)| *id != target);
                    for d in defaults {
                        self.raw_defaults.push((target, d, Arc::clone(&env.prefixes)));
                    }
                }
                SnodeKind::Choice { .. } => {
                    self.raw_choice_defaults.retain(|(id, _)| *id != target);
                    self.raw_choice_defaults.push((target, defaults[0].clone()));
                }
                _ => return Err(Error::semantic("refine default on an unsupported node")),
            }
        }
        if refine.has(Keyword::MinElements) || refine.has(Keyword::MaxElements) {
            let (min, max) = parse_min_max(refine)?;
            match &mut self.set.node_mut(target).kind {
                SnodeKind::List { min_elements, max_elements, .. }
                | SnodeKind::LeafList { min_elements, max_elements, .. } => {
                    if refine.has(Keyword::MinElements) {
                        *min_elements = min;
                    }
                    if refine.has(Keyword::MaxElements) {
                        *max_elements = max;
                    }
                }
                _ => return Err(Error::semantic("refine min/max-elements on a non-list")),
            }
        }
        for m in refine.find_all(Keyword::Must) {
            let must = MustCond {
                expr: parse_xpath(self.interner, m.arg())?,
                prefixes: Arc::clone(&env.prefixes),
                error_message: m.arg_of(Keyword::ErrorMessage).map(|s| self.interner.intern(s)),
                error_app_tag: m.arg_of(Keyword::ErrorAppTag).map(|s| self.interner.intern(s)),
            };
            self.set.node_mut(target).musts.push(must);
        }
        Ok(())
    }

    // ==================================================================
    // Global passes
    // ==================================================================

    /// Top-level augments from every implemented module, in compilation
    /// order.
    fn apply_augments(&mut self) -> Result<()> {
        let module_ids: Vec<(IStr, ModuleId)> = self
            .compiled
            .iter()
            .map(|(n, &id)| (n.clone(), id))
            .collect();
        // Compilation order == module table order.
        let mut ordered = module_ids;
        ordered.sort_by_key(|(_, id)| id.0);

        for (name, module_id) in ordered {
            if !self.set.module(module_id).implemented {
                continue;
            }
            let entry = self.parsed.get(&*name).expect("compiled module is registered");
            let pm: &'a ParsedModule = &entry.module;
            let submods = self.submodules_of(pm)?;
            let mut roots: Vec<&'a Statement> = vec![pm.root()];
            roots.extend(submods.iter().map(|s| s.root()));
            for root in roots {
                let augments: Vec<&'a Statement> = root.find_all(Keyword::Augment).collect();
                for aug in augments {
                    let env = ModEnv {
                        target: module_id,
                        def: pm,
                        def_id: module_id,
                        prefixes: Arc::clone(&self.set.module(module_id).prefixes),
                        scopes: vec![root],
                    };
                    if !self.if_features_enabled(aug, &env)? {
                        continue;
                    }
                    debug!(module = %name, target = %aug.arg(), "applying augment");
                    let target = self.resolve_schema_path(aug.arg(), &env)?;
                    self.apply_augment_children(aug, &env, target)?;
                }
            }
        }
        Ok(())
    }

    fn apply_augment_children(
        &mut self,
        aug: &'a Statement,
        env: &ModEnv<'a>,
        target: SnodeId,
    ) -> Result<()> {
        // Augmenting another module's node inherits its config.
        let target_node = self.set.node(target);
        let inherit = Inherit {
            config: target_node.is_config(),
            status: target_node.status,
            operation: matches!(
                target_node.kind,
                SnodeKind::Rpc
                    | SnodeKind::Action
                    | SnodeKind::Input
                    | SnodeKind::Output
                    | SnodeKind::Notification
            ),
        };
        let is_choice = matches!(target_node.kind, SnodeKind::Choice { .. });

        let mut env2 = env.clone();
        env2.scopes.push(aug);
        let when = match aug.find(Keyword::When) {
            Some(w) => Some(WhenCond {
                expr: parse_xpath(self.interner, w.arg())?,
                prefixes: Arc::clone(&env.prefixes),
            }),
            None => None,
        };

        let mut created = Vec::new();
        for child in aug.children.iter() {
            let cid = match child.keyword {
                Keyword::Case if is_choice => {
                    self.compile_case(child, &env2, Some(target), inherit)?
                }
                Keyword::Container
                | Keyword::Leaf
                | Keyword::LeafList
                | Keyword::List
                | Keyword::Choice
                | Keyword::Anydata
                | Keyword::Anyxml => {
                    match self.compile_data_node(child, &env2, Some(target), inherit)? {
                        Some(id) => id,
                        None => continue,
                    }
                }
                Keyword::Uses => {
                    self.expand_uses(child, &env2, Some(target), inherit)?;
                    continue;
                }
                Keyword::Action => {
                    match self.compile_operation(child, &env2, Some(target), SnodeKind::Action)? {
                        Some(id) => id,
                        None => continue,
                    }
                }
                Keyword::Notification => {
                    match self.compile_notification(child, &env2, Some(target))? {
                        Some(id) => id,
                        None => continue,
                    }
                }
                _ => continue,
            };
            created.push(cid);
            self.set.node_mut(target).children.push(cid);
        }

        // Augmenting a key leaf in is forbidden; adding a mandatory node
        // from another module is too (RFC 7950 §7.17).
        if self.set.node(target).module != env.target {
            for &id in &created {
                if self.set.node(id).is_mandatory() && self.set.node(id).when.is_none() {
                    return Err(Error::semantic(format!(
                        "augment adds mandatory node \"{}\" to another module",
                        self.set.node(id).name
                    )));
                }
            }
        }
        if let Some(when) = when {
            for &id in &created {
                if self.set.node(id).when.is_none() {
                    self.set.node_mut(id).when = Some(when.clone());
                }
            }
        }
        Ok(())
    }

    /// Resolve an absolute schema-node-id like `/p:a/b/p2:c`.
    fn resolve_schema_path(&self, path: &str, env: &ModEnv<'a>) -> Result<SnodeId> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| Error::syntax(format!("schema path \"{path}\" is not absolute")))?;
        let mut current: Option<SnodeId> = None;
        for segment in rest.split('/') {
            let (module_id, name) = match segment.split_once(':') {
                Some((prefix, n)) => {
                    let module_name = env.prefixes.get(prefix).ok_or_else(|| {
                        Error::not_found(format!("unknown prefix \"{prefix}\" in \"{path}\""))
                    })?;
                    let id = self.set.find_module(module_name).ok_or_else(|| {
                        Error::not_found(format!("module \"{module_name}\" not compiled"))
                    })?;
                    (id, n)
                }
                None => (env.target, segment),
            };
            let children: Vec<SnodeId> = match current {
                Some(p) => self.set.node(p).children.clone(),
                None => self.set.top_level(module_id).collect(),
            };
            let found = children
                .iter()
                .copied()
                .find(|&c| {
                    let n = self.set.node(c);
                    n.module == module_id && &*n.name == name
                })
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "schema path \"{path}\": node \"{segment}\" not found"
                    ))
                })?;
            current = Some(found);
        }
        current.ok_or_else(|| Error::syntax(format!("empty schema path \"{path}\"")))
    }

    /// Deviations, applied in module compilation order.
    fn apply_deviations(&mut self) -> Result<()> {
        let mut ordered: Vec<(IStr, ModuleId)> = self
            .compiled
            .iter()
            .map(|(n, &id)| (n.clone(), id))
            .collect();
        ordered.sort_by_key(|(_, id)| id.0);

        for (name, module_id) in ordered {
            if !self.set.module(module_id).implemented {
                continue;
            }
            let entry = self.parsed.get(&*name).expect("compiled module is registered");
            let pm: &'a ParsedModule = &entry.module;
            let deviations: Vec<&'a Statement> = pm.deviations().collect();
            for dev in deviations {
                let env = ModEnv {
                    target: module_id,
                    def: pm,
                    def_id: module_id,
                    prefixes: Arc::clone(&self.set.module(module_id).prefixes),
                    scopes: vec![pm.root()],
                };
                debug!(module = %name, target = %dev.arg(), "applying deviation");
                let target = self.resolve_schema_path(dev.arg(), &env)?;
                for deviate in dev.find_all(Keyword::Deviate) {
                    self.apply_deviate(target, deviate, &env)?;
                }
            }
        }
        Ok(())
    }

    fn apply_deviate(
        &mut self,
        target: SnodeId,
        deviate: &'a Statement,
        env: &ModEnv<'a>,
    ) -> Result<()> {
        match deviate.arg() {
            "not-supported" => {
                self.remove_node(target);
            }
            "add" | "replace" => {
                let replace = deviate.arg() == "replace";
                if let Some(type_stmt) = deviate.find(Keyword::Type) {
                    if !replace {
                        return Err(Error::semantic("deviate add cannot change a type"));
                    }
                    let resolved = self.compile_type(type_stmt, env, &mut Vec::new())?;
                    match &mut self.set.node_mut(target).kind {
                        SnodeKind::Leaf { typ, .. } | SnodeKind::LeafList { typ, .. } => {
                            *typ = CompiledType {
                                typedef: resolved.typedef,
                                kind: resolved.kind,
                            };
                        }
                        _ => return Err(Error::semantic("deviate type on a non-leaf")),
                    }
                }
                if let Some(c) = deviate.arg_of(Keyword::Config) {
                    let set_config = c == "true";
                    for id in self.set.traverse(target) {
                        if set_config {
                            self.set.node_mut(id).flags |= SchemaFlags::CONFIG;
                        } else {
                            self.set.node_mut(id).flags -= SchemaFlags::CONFIG;
                        }
                    }
                }
                if let Some(m) = deviate.arg_of(Keyword::Mandatory) {
                    let node = self.set.node_mut(target);
                    if m == "true" {
                        node.flags |= SchemaFlags::MANDATORY;
                    } else {
                        node.flags -= SchemaFlags::MANDATORY;
                    }
                }
                if deviate.has(Keyword::MinElements) || deviate.has(Keyword::MaxElements) {
                    let (min, max) = parse_min_max(deviate)?;
                    match &mut self.set.node_mut(target).kind {
                        SnodeKind::List { min_elements, max_elements, .. }
                        | SnodeKind::LeafList { min_elements, max_elements, .. } => {
                            if deviate.has(Keyword::MinElements) {
                                *min_elements = min;
                            }
                            if deviate.has(Keyword::MaxElements) {
                                *max_elements = max;
                            }
                        }
                        _ => {
                            return Err(Error::semantic(
                                "deviate min/max-elements on a non-list",
                            ));
                        }
                    }
                }
                if deviate.has(Keyword::Default) {
                    let defaults: Vec<IStr> = deviate
                        .find_all(Keyword::Default)
                        .map(|d| self.interner.intern(d.arg()))
                        .collect();
                    self.raw_defaults.retain(|(id, _, _)| *id != target);
                    match &self.set.node(target).kind {
                        SnodeKind::Leaf { .. } => {
                            self.raw_defaults.push((
                                target,
                                defaults[0].clone(),
                                Arc::clone(&env.prefixes),
                            ));
                        }
                        SnodeKind::LeafList { .. } => {
                            for d in defaults {
                                self.raw_defaults.push((target, d, Arc::clone(&env.prefixes)));
                            }
                        }
                        SnodeKind::Choice { .. } => {
                            self.raw_choice_defaults.retain(|(id, _)| *id != target);
                            self.raw_choice_defaults.push((target, defaults[0].clone()));
                        }
                        _ => return Err(Error::semantic("deviate default on unsupported node")),
                    }
                }
                for m in deviate.find_all(Keyword::Must) {
                    let must = MustCond {
                        expr: parse_xpath(self.interner, m.arg())?,
                        prefixes: Arc::clone(&env.prefixes),
                        error_message: m
                            .arg_of(Keyword::ErrorMessage)
                            .map(|s| self.interner.intern(s)),
                        error_app_tag: m
                            .arg_of(Keyword::ErrorAppTag)
                            .map(|s| self.interner.intern(s)),
                    };
                    self.set.node_mut(target).musts.push(must);
                }
                if let Some(u) = deviate.arg_of(Keyword::Units) {
                    let u = self.interner.intern(u);
                    match &mut self.set.node_mut(target).kind {
                        SnodeKind::Leaf { units, .. } | SnodeKind::LeafList { units, .. } => {
                            *units = Some(u);
                        }
                        _ => return Err(Error::semantic("deviate units on a non-leaf")),
                    }
                }
            }
            "delete" => {
                if deviate.has(Keyword::Default) {
                    self.raw_defaults.retain(|(id, _, _)| *id != target);
                    self.raw_choice_defaults.retain(|(id, _)| *id != target);
                }
                for m in deviate.find_all(Keyword::Must) {
                    let text = m.arg();
                    self.set
                        .node_mut(target)
                        .musts
                        .retain(|must| &*must.expr.text != text);
                }
                if let Some(u) = deviate.arg_of(Keyword::Unique) {
                    if let SnodeKind::List { uniques, .. } = &mut self.set.node_mut(target).kind {
                        uniques.retain(|uq| &*uq.text != u);
                    }
                }
                if deviate.has(Keyword::Units) {
                    match &mut self.set.node_mut(target).kind {
                        SnodeKind::Leaf { units, .. } | SnodeKind::LeafList { units, .. } => {
                            *units = None;
                        }
                        _ => {}
                    }
                }
            }
            other => {
                return Err(Error::syntax(format!("invalid deviate \"{other}\"")));
            }
        }
        Ok(())
    }

    fn remove_node(&mut self, target: SnodeId) {
        let parent = self.set.node(target).parent;
        match parent {
            Some(p) => self.set.node_mut(p).children.retain(|&c| c != target),
            None => {
                let module = self.set.node(target).module;
                let m = self.set.module_mut(module);
                m.children.retain(|&c| c != target);
                m.rpcs.retain(|&c| c != target);
                m.notifications.retain(|&c| c != target);
            }
        }
        self.raw_defaults.retain(|(id, _, _)| *id != target);
        self.raw_choice_defaults.retain(|(id, _)| *id != target);
    }

    fn compute_identity_closure(&mut self) {
        // Reverse edges: base -> directly derived.
        let mut direct: Vec<Vec<IdentityId>> = vec![Vec::new(); self.set.identities.len()];
        for (i, ident) in self.set.identities.iter().enumerate() {
            for &base in &ident.bases {
                direct[base.0 as usize].push(IdentityId(i as u32));
            }
        }
        for i in 0..self.set.identities.len() {
            let mut seen = FxHashSet::default();
            let mut stack: Vec<IdentityId> = direct[i].clone();
            while let Some(d) = stack.pop() {
                if seen.insert(d) {
                    stack.extend(direct[d.0 as usize].iter().copied());
                }
            }
            let mut derived: Vec<IdentityId> = seen.into_iter().collect();
            derived.sort_by_key(|d| d.0);
            self.set.identities[i].derived = derived;
        }
    }

    /// Resolve leafref targets and their real types.
    fn resolve_leafrefs(&mut self) -> Result<()> {
        for idx in 0..self.set.snodes.len() {
            let id = SnodeId(idx as u32);
            let Some(typ) = self.set.node(id).typ() else { continue };
            let TypeKind::LeafRef { path, prefixes, .. } = &typ.kind else { continue };
            let path = path.clone();
            let prefixes = Arc::clone(prefixes);
            trace!(node = %self.set.schema_path(id), path = %path.text, "resolving leafref");

            let target = self.resolve_leafref_path(id, &path.root, &prefixes)?;
            let target_node = self.set.node(target);
            if !matches!(
                target_node.kind,
                SnodeKind::Leaf { .. } | SnodeKind::LeafList { .. }
            ) {
                return Err(Error::semantic(format!(
                    "leafref path \"{}\" does not point at a leaf or leaf-list",
                    path.text
                )));
            }

            // Chase leafref chains to the real type, watching for cycles.
            let mut real = target_node.typ().cloned().expect("target is a leaf");
            let mut seen = vec![id, target];
            let mut cursor = target;
            while let TypeKind::LeafRef { path: next_path, prefixes: next_prefixes, .. } =
                &real.kind
            {
                let next_path = next_path.clone();
                let next_prefixes = Arc::clone(next_prefixes);
                let next = self.resolve_leafref_path(cursor, &next_path.root, &next_prefixes)?;
                if seen.contains(&next) {
                    return Err(Error::semantic(format!(
                        "leafref cycle through \"{}\"",
                        next_path.text
                    )));
                }
                seen.push(next);
                real = self.set.node(next).typ().cloned().ok_or_else(|| {
                    Error::semantic("leafref target is not typed".to_string())
                })?;
                cursor = next;
            }

            if let Some(t) = self.set.node_mut(id).typ_mut() {
                if let TypeKind::LeafRef { target: slot, realtype, .. } = &mut t.kind {
                    *slot = Some(target);
                    *realtype = Some(Box::new(real));
                }
            }
        }
        Ok(())
    }

    /// Walk a leafref path (child/parent steps only) over the schema tree.
    fn resolve_leafref_path(
        &self,
        from: SnodeId,
        expr: &Expr,
        prefixes: &PrefixMap,
    ) -> Result<SnodeId> {
        let Expr::Path(path) = expr else {
            return Err(Error::semantic("leafref path must be a location path"));
        };
        // Data-tree semantics: relative paths start at the leaf's parent.
        let mut current: Option<SnodeId> = match path.start {
            PathStart::Root => None,
            PathStart::Current => self.data_parent(from),
            PathStart::Expr(_) => {
                return Err(Error::semantic("leafref path cannot start with an expression"));
            }
        };
        let from_module = self.set.node(from).module;

        for step in &path.steps {
            match step.axis {
                Axis::Parent => {
                    current = match current {
                        Some(c) => self.data_parent(c),
                        None => {
                            return Err(Error::semantic(
                                "leafref path escapes the schema root",
                            ));
                        }
                    };
                    continue;
                }
                Axis::Child => {}
                Axis::SelfAxis => continue,
                _ => {
                    return Err(Error::semantic(
                        "leafref paths use only child and parent steps",
                    ));
                }
            }
            let NodeTest::Name { prefix, name } = &step.test else {
                return Err(Error::semantic("leafref path steps must be named"));
            };
            let module_id = match prefix {
                Some(p) => {
                    let module_name = prefixes.get(p).ok_or_else(|| {
                        Error::not_found(format!("unknown prefix \"{p}\" in leafref path"))
                    })?;
                    self.set.find_module(module_name).ok_or_else(|| {
                        Error::not_found(format!("module \"{module_name}\" not compiled"))
                    })?
                }
                None => match current {
                    Some(c) => self.set.node(c).module,
                    None => from_module,
                },
            };
            let found = self
                .set
                .find_data_child(module_id, current, module_id, name)
                .ok_or_else(|| {
                    Error::not_found(format!("leafref path node \"{name}\" not found"))
                })?;
            current = Some(found);
        }
        current.ok_or_else(|| Error::semantic("empty leafref path"))
    }

    /// The nearest ancestor that is a data node (skipping choice/case).
    fn data_parent(&self, id: SnodeId) -> Option<SnodeId> {
        let mut cur = self.set.node(id).parent;
        while let Some(p) = cur {
            if self.set.node(p).is_data_node() {
                return Some(p);
            }
            cur = self.set.node(p).parent;
        }
        None
    }

    /// Store leaf/leaf-list defaults through the value engine and resolve
    /// choice default cases.
    fn store_defaults(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.raw_defaults);
        for (id, raw, prefixes) in pending {
            let typ = self
                .set
                .node(id)
                .typ()
                .cloned()
                .ok_or_else(|| Error::Internal("default on an untyped node".into()))?;
            let value =
                store(&self.set, &prefixes, &typ, &raw, ValueFmt::Json).map_err(|e| {
                    Error::semantic(format!(
                        "invalid default \"{raw}\" for \"{}\": {e}",
                        self.set.schema_path(id)
                    ))
                })?;
            match &mut self.set.node_mut(id).kind {
                SnodeKind::Leaf { default, .. } => *default = Some(value),
                SnodeKind::LeafList { defaults, .. } => defaults.push(value),
                _ => return Err(Error::Internal("default on an unsupported node".into())),
            }
        }

        let pending_cases = std::mem::take(&mut self.raw_choice_defaults);
        for (id, case_name) in pending_cases {
            let case = self
                .set
                .node(id)
                .children
                .iter()
                .copied()
                .find(|&c| &*self.set.node(c).name == &*case_name)
                .ok_or_else(|| {
                    Error::not_found(format!("default case \"{case_name}\" not found"))
                })?;
            if let SnodeKind::Choice { default_case } = &mut self.set.node_mut(id).kind {
                *default_case = Some(case);
            }
        }
        Ok(())
    }

    /// No two sibling data nodes may share a name, descending through
    /// choice and case.
    fn check_duplicates(&self) -> Result<()> {
        let mut parents: Vec<Vec<SnodeId>> = Vec::new();
        for m in 0..self.set.modules.len() {
            parents.push(self.set.top_level(ModuleId(m as u32)).collect());
        }
        for node in &self.set.snodes {
            if !node.children.is_empty() {
                parents.push(node.children.clone());
            }
        }
        for children in parents {
            let mut seen: FxHashMap<(u32, IStr), SnodeId> = FxHashMap::default();
            let mut stack: Vec<SnodeId> = children;
            while let Some(id) = stack.pop() {
                let node = self.set.node(id);
                match node.kind {
                    SnodeKind::Choice { .. } | SnodeKind::Case => {
                        stack.extend(node.children.iter().copied());
                    }
                    _ => {
                        let key = (node.module.0, node.name.clone());
                        if let Some(&other) = seen.get(&key) {
                            if other != id {
                                return Err(Error::duplicate(format!(
                                    "duplicate data node \"{}\"",
                                    self.set.schema_path(id)
                                )));
                            }
                        }
                        seen.insert(key, id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Extra typed accessor used only here.
impl crate::schema::SchemaNode {
    fn typ_mut(&mut self) -> Option<&mut CompiledType> {
        match &mut self.kind {
            SnodeKind::Leaf { typ, .. } | SnodeKind::LeafList { typ, .. } => Some(typ),
            _ => None,
        }
    }
}

struct ResolvedType {
    kind: TypeKind,
    default: Option<IStr>,
    units: Option<IStr>,
    typedef: Option<IStr>,
}

fn data_def_stmts(stmt: &Statement) -> impl Iterator<Item = &Statement> {
    stmt.data_defs()
}

fn parse_status(stmt: &Statement) -> Result<Status> {
    match stmt.arg_of(Keyword::Status) {
        None => Ok(Status::Current),
        Some(s) => {
            Status::parse(s).ok_or_else(|| Error::syntax(format!("invalid status \"{s}\"")))
        }
    }
}

/// Child status may not be "less obsolete" than the parent's.
fn child_status(stmt: &Statement, parent: Status) -> Result<Status> {
    let own = parse_status(stmt)?;
    if own < parent {
        return Err(Error::semantic_at(
            format!(
                "status \"{}\" conflicts with parent status \"{}\"",
                own.as_str(),
                parent.as_str()
            ),
            stmt.pos,
        ));
    }
    Ok(own.max(parent))
}

fn parse_require_instance(ts: &Statement) -> Result<bool> {
    match ts.arg_of(Keyword::RequireInstance) {
        None => Ok(true),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(Error::syntax(format!("invalid require-instance \"{other}\""))),
    }
}

fn parse_min_max(stmt: &Statement) -> Result<(u32, Option<u32>)> {
    let min = match stmt.arg_of(Keyword::MinElements) {
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| Error::syntax(format!("invalid min-elements \"{v}\"")))?,
        None => 0,
    };
    let max = match stmt.arg_of(Keyword::MaxElements) {
        Some("unbounded") | None => None,
        Some(v) => Some(
            v.parse::<u32>()
                .map_err(|_| Error::syntax(format!("invalid max-elements \"{v}\"")))?,
        ),
    };
    if let Some(m) = max {
        if min > m {
            return Err(Error::semantic("min-elements is greater than max-elements"));
        }
    }
    Ok((min, max))
}

/// Restriction substatements a `type` statement may carry for its base.
/// Anything else on the statement is a misplaced restriction.
fn ensure_substmts(ts: &Statement, allowed: &[Keyword]) -> Result<()> {
    const RESTRICTIONS: &[Keyword] = &[
        Keyword::Range,
        Keyword::Length,
        Keyword::Pattern,
        Keyword::FractionDigits,
        Keyword::Enum,
        Keyword::Bit,
        Keyword::Base,
        Keyword::Path,
        Keyword::RequireInstance,
        Keyword::Type,
    ];
    for child in &ts.children {
        if RESTRICTIONS.contains(&child.keyword) && !allowed.contains(&child.keyword) {
            return Err(Error::semantic_at(
                format!(
                    "restriction \"{}\" is not valid for type \"{}\"",
                    child.keyword,
                    ts.arg()
                ),
                child.pos,
            ));
        }
    }
    Ok(())
}

/// A descendant schema path for `unique`, relative to the list.
impl<'a> Compiler<'a, '_> {
    fn resolve_descendant(
        &self,
        list: SnodeId,
        path: &str,
        env: &ModEnv<'a>,
    ) -> Result<SnodeId> {
        let mut current = list;
        for segment in path.split('/') {
            let name = segment.rsplit_once(':').map(|(_, n)| n).unwrap_or(segment);
            let module = self.set.node(current).module;
            let found = self
                .set
                .find_data_child(module, Some(current), module, name)
                .or_else(|| {
                    // The segment may belong to another module via prefix.
                    segment.split_once(':').and_then(|(p, n)| {
                        let module_name = env.prefixes.get(p)?;
                        let mid = self.set.find_module(module_name)?;
                        self.set.find_data_child(mid, Some(current), mid, n)
                    })
                })
                .ok_or_else(|| {
                    Error::not_found(format!("unique path \"{path}\" not found"))
                })?;
            current = found;
        }
        Ok(current)
    }
}
