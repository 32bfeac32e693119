use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Name under which a definition is registered in a container.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Arc<str>);

impl Identifier {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// camelCase of the short type name: `UserService` → `userService`.
    pub fn of<T: ?Sized>() -> Self {
        Self::new(camel_case(short_type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for Identifier {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub(crate) fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Instance-sharing policy of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One instance per owning container, for its whole lifetime.
    #[default]
    Singleton,
    /// One instance per request (child) container.
    Request,
    /// A new instance on every resolve.
    Prototype,
}

/// Type identity of a registered class.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassKey {
    id: TypeId,
    name: &'static str,
}

impl ClassKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl fmt::Debug for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Class,
    Property,
    Method,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Class => "class",
            TargetKind::Property => "property",
            TargetKind::Method => "method",
        })
    }
}

/// What a decorator is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Class(ClassKey),
    Property(ClassKey, String),
    Method(ClassKey, String),
}

impl Target {
    pub fn class(&self) -> ClassKey {
        match self {
            Target::Class(c) | Target::Property(c, _) | Target::Method(c, _) => *c,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Class(_) => TargetKind::Class,
            Target::Property(..) => TargetKind::Property,
            Target::Method(..) => TargetKind::Method,
        }
    }

    /// Property or method name; `None` for class targets.
    pub fn member(&self) -> Option<&str> {
        match self {
            Target::Class(_) => None,
            Target::Property(_, m) | Target::Method(_, m) => Some(m),
        }
    }
}
