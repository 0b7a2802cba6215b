//! Purpose: Interface description handed over by the binding generator, plus API checksums.
//! Exports: `ComponentDef` and friends, `EntryPoint`, `Contract`, `CONTRACT_VERSION`.
//! Role: Single source for entry-point names and the checksums both sides bake in.
//! Invariants: A checksum depends only on the signature (names, types, order, error, async).
//! Invariants: Entry-point names are derived, never configured, so both sides agree.
use crate::core::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Bumped whenever the fixed entry points or struct layouts change.
pub const CONTRACT_VERSION: u32 = 1;
pub const CONTRACT_VERSION_SYMBOL: &str = "uniwire_contract_version";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ComponentDef {
    pub namespace: String,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub callback_interfaces: Vec<CallbackInterfaceDef>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgDef>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub throws: Option<String>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ArgDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default)]
    pub constructors: Vec<FunctionDef>,
    #[serde(default)]
    pub methods: Vec<FunctionDef>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CallbackInterfaceDef {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<FunctionDef>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointKind {
    Function,
    Constructor,
    Method,
    CloneObject,
    FreeObject,
    CallbackMethod,
    InitCallbackVtable,
}

impl EntryPointKind {
    fn tag(self) -> &'static str {
        match self {
            EntryPointKind::Function => "func",
            EntryPointKind::Constructor => "constructor",
            EntryPointKind::Method => "method",
            EntryPointKind::CloneObject => "clone",
            EntryPointKind::FreeObject => "free",
            EntryPointKind::CallbackMethod => "callback",
            EntryPointKind::InitCallbackVtable => "init_callback_vtable",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct EntryPoint {
    pub kind: EntryPointKind,
    pub name: String,
    /// Native symbol to call; absent for callback methods, which live in a vtable.
    pub symbol: Option<String>,
    pub checksum_symbol: Option<String>,
    pub checksum: Option<u16>,
    #[serde(rename = "async")]
    pub is_async: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub symbol: String,
    pub expected: u16,
}

/// Everything the loader verifies before a component is used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub namespace: String,
    pub contract_version: u32,
    pub checksums: Vec<ChecksumEntry>,
}

impl Contract {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            contract_version: CONTRACT_VERSION,
            checksums: Vec::new(),
        }
    }

    pub fn with_checksum(mut self, symbol: impl Into<String>, expected: u16) -> Self {
        self.checksums.push(ChecksumEntry {
            symbol: symbol.into(),
            expected,
        });
        self
    }
}

impl ComponentDef {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let def: ComponentDef = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid component definition")
                .with_source(err)
        })?;
        def.validate()?;
        Ok(def)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!(
                    "failed to read component definition {}",
                    path.display()
                ))
                .with_source(err)
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), Error> {
        if !is_identifier(&self.namespace) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid namespace {:?}", self.namespace)));
        }
        let signatures: Vec<&FunctionDef> = self
            .functions
            .iter()
            .chain(
                self.objects
                    .iter()
                    .flat_map(|obj| obj.constructors.iter().chain(obj.methods.iter())),
            )
            .chain(self.callback_interfaces.iter().flat_map(|cb| cb.methods.iter()))
            .collect();
        let names = self
            .objects
            .iter()
            .map(|obj| obj.name.as_str())
            .chain(self.callback_interfaces.iter().map(|cb| cb.name.as_str()))
            .chain(signatures.iter().map(|func| func.name.as_str()))
            .chain(
                signatures
                    .iter()
                    .flat_map(|func| func.args.iter().map(|arg| arg.name.as_str())),
            );
        for name in names {
            if !is_identifier(name) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid identifier {name:?}")));
            }
        }

        // Lowercasing and `_` joins can fold distinct names onto one symbol.
        let mut seen = HashSet::new();
        for entry in self.entry_points() {
            for symbol in entry.symbol.into_iter().chain(entry.checksum_symbol) {
                if seen.contains(&symbol) {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "{:?} maps to an entry point that is already taken",
                            entry.name
                        ))
                        .with_symbol(symbol)
                        .with_hint("Rename one of the colliding definitions."));
                }
                seen.insert(symbol);
            }
        }
        Ok(())
    }

    pub fn entry_points(&self) -> Vec<EntryPoint> {
        let ns = self.namespace.to_lowercase();
        let mut out = Vec::new();
        for func in &self.functions {
            out.push(checked_entry(&ns, EntryPointKind::Function, None, func));
        }
        for obj in &self.objects {
            let owner = obj.name.to_lowercase();
            out.push(plain_entry(&ns, EntryPointKind::CloneObject, &owner));
            out.push(plain_entry(&ns, EntryPointKind::FreeObject, &owner));
            for cons in &obj.constructors {
                out.push(checked_entry(&ns, EntryPointKind::Constructor, Some(&owner), cons));
            }
            for method in &obj.methods {
                out.push(checked_entry(&ns, EntryPointKind::Method, Some(&owner), method));
            }
        }
        for cb in &self.callback_interfaces {
            let owner = cb.name.to_lowercase();
            out.push(plain_entry(&ns, EntryPointKind::InitCallbackVtable, &owner));
            for method in &cb.methods {
                let mut entry = checked_entry(&ns, EntryPointKind::CallbackMethod, Some(&owner), method);
                entry.symbol = None;
                out.push(entry);
            }
        }
        out
    }

    pub fn contract(&self) -> Contract {
        let mut contract = Contract::new(self.namespace.clone());
        for entry in self.entry_points() {
            if let (Some(symbol), Some(expected)) = (entry.checksum_symbol, entry.checksum) {
                contract = contract.with_checksum(symbol, expected);
            }
        }
        contract
    }
}

pub fn function_symbol(namespace: &str, name: &str) -> String {
    entry_symbol(&namespace.to_lowercase(), EntryPointKind::Function, None, name)
}

pub fn method_symbol(namespace: &str, object: &str, name: &str) -> String {
    entry_symbol(
        &namespace.to_lowercase(),
        EntryPointKind::Method,
        Some(&object.to_lowercase()),
        name,
    )
}

pub fn constructor_symbol(namespace: &str, object: &str, name: &str) -> String {
    entry_symbol(
        &namespace.to_lowercase(),
        EntryPointKind::Constructor,
        Some(&object.to_lowercase()),
        name,
    )
}

/// Symbol of an owner-level entry point (object clone/free, vtable init).
pub fn owner_symbol(namespace: &str, kind: EntryPointKind, owner: &str) -> String {
    format!(
        "uniwire_{}_fn_{}_{}",
        namespace.to_lowercase(),
        kind.tag(),
        owner.to_lowercase()
    )
}

fn entry_symbol(ns: &str, kind: EntryPointKind, owner: Option<&str>, name: &str) -> String {
    match owner {
        Some(owner) => format!("uniwire_{ns}_fn_{}_{owner}_{}", kind.tag(), name.to_lowercase()),
        None => format!("uniwire_{ns}_fn_{}_{}", kind.tag(), name.to_lowercase()),
    }
}

fn checksum_symbol(ns: &str, kind: EntryPointKind, owner: Option<&str>, name: &str) -> String {
    match owner {
        Some(owner) => format!(
            "uniwire_{ns}_checksum_{}_{owner}_{}",
            kind.tag(),
            name.to_lowercase()
        ),
        None => format!("uniwire_{ns}_checksum_{}_{}", kind.tag(), name.to_lowercase()),
    }
}

fn plain_entry(ns: &str, kind: EntryPointKind, owner: &str) -> EntryPoint {
    EntryPoint {
        kind,
        name: owner.to_string(),
        symbol: Some(owner_symbol(ns, kind, owner)),
        checksum_symbol: None,
        checksum: None,
        is_async: false,
    }
}

fn checked_entry(
    ns: &str,
    kind: EntryPointKind,
    owner: Option<&str>,
    func: &FunctionDef,
) -> EntryPoint {
    EntryPoint {
        kind,
        name: func.name.clone(),
        symbol: Some(entry_symbol(ns, kind, owner, &func.name)),
        checksum_symbol: Some(checksum_symbol(ns, kind, owner, &func.name)),
        checksum: Some(signature_checksum(kind, owner, func)),
        is_async: func.is_async,
    }
}

/// First two bytes (big-endian) of a SHA-256 over the canonical signature.
///
/// Every text field is absorbed behind its u64 big-endian byte length, so
/// moving characters across a field boundary changes the digest.
pub fn signature_checksum(kind: EntryPointKind, owner: Option<&str>, func: &FunctionDef) -> u16 {
    let mut hasher = Sha256::new();
    absorb(&mut hasher, kind.tag());
    absorb(&mut hasher, owner.unwrap_or(""));
    absorb(&mut hasher, &func.name);
    hasher.update((func.args.len() as u64).to_be_bytes());
    for arg in &func.args {
        absorb(&mut hasher, &arg.name);
        absorb(&mut hasher, &arg.ty);
    }
    absorb(&mut hasher, func.returns.as_deref().unwrap_or(""));
    absorb(&mut hasher, func.throws.as_deref().unwrap_or(""));
    hasher.update([u8::from(func.is_async)]);
    let digest = hasher.finalize();
    u16::from_be_bytes([digest[0], digest[1]])
}

fn absorb(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
