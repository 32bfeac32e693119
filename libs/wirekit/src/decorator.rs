use crate::error::DecoratorError;
use crate::framework::FrameworkType;
use crate::identifier::{camel_case, Identifier, Scope, Target, TargetKind};
use crate::metadata::MetadataRegistry;
use serde_json::{json, Value};

pub const PROVIDE_KEY: &str = "provide";
pub const SCOPE_KEY: &str = "scope";
pub const CONFIGURATION_KEY: &str = "configuration";
pub const FRAMEWORK_KEY: &str = "framework";
pub const PRELOAD_KEY: &str = "preload";
pub const CONSTRUCTOR_KEY: &str = "constructor";
pub const INJECT_KEY: &str = "inject";
pub const HANDLER_KEY: &str = "handler";
pub const INIT_KEY: &str = "init";
pub const DESTROY_KEY: &str = "destroy";

/// Built-in handler keys.
pub const CONFIG_HANDLER: &str = "config";
pub const LOGGER_HANDLER: &str = "logger";
pub const APP_HANDLER: &str = "app";

/// Wildcard path of the `config` handler.
pub const ALL_CONFIG: &str = "all";

/// Declarative annotations. Applying one only writes metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Decorator {
    Provide(Option<Identifier>),
    Scope(Scope),
    Configuration { namespace: Option<String> },
    Framework,
    Preload,
    Constructor(Vec<Identifier>),
    Inject(Option<Identifier>),
    Config(Option<String>),
    Logger(Option<String>),
    App(Option<FrameworkType>),
    Handler {
        key: String,
        identifier: Option<String>,
    },
    Init,
    Destroy,
}

impl Decorator {
    pub fn name(&self) -> &'static str {
        match self {
            Decorator::Provide(_) => "Provide",
            Decorator::Scope(_) => "Scope",
            Decorator::Configuration { .. } => "Configuration",
            Decorator::Framework => "Framework",
            Decorator::Preload => "Preload",
            Decorator::Constructor(_) => "Constructor",
            Decorator::Inject(_) => "Inject",
            Decorator::Config(_) => "Config",
            Decorator::Logger(_) => "Logger",
            Decorator::App(_) => "App",
            Decorator::Handler { .. } => "Handler",
            Decorator::Init => "Init",
            Decorator::Destroy => "Destroy",
        }
    }

    pub fn target_kind(&self) -> TargetKind {
        match self {
            Decorator::Provide(_)
            | Decorator::Scope(_)
            | Decorator::Configuration { .. }
            | Decorator::Framework
            | Decorator::Preload
            | Decorator::Constructor(_) => TargetKind::Class,
            Decorator::Inject(_)
            | Decorator::Config(_)
            | Decorator::Logger(_)
            | Decorator::App(_)
            | Decorator::Handler { .. } => TargetKind::Property,
            Decorator::Init | Decorator::Destroy => TargetKind::Method,
        }
    }

    /// Write this decorator's metadata for `target`.
    pub fn apply(&self, registry: &mut MetadataRegistry, target: &Target) -> Result<(), DecoratorError> {
        if target.kind() != self.target_kind() {
            return Err(DecoratorError::UnsupportedTarget {
                decorator: self.name(),
                expected: self.target_kind(),
                found: target.kind(),
            });
        }

        let (key, value) = match self {
            Decorator::Provide(id) => {
                let id = id.clone().unwrap_or_else(|| Identifier::new(camel_case(target.class().name())));
                (PROVIDE_KEY, json!({ "identifier": id }))
            }
            Decorator::Scope(scope) => (SCOPE_KEY, json!({ "scope": scope })),
            Decorator::Configuration { namespace } => {
                (CONFIGURATION_KEY, json!({ "namespace": namespace }))
            }
            Decorator::Framework => (FRAMEWORK_KEY, Value::Bool(true)),
            Decorator::Preload => (PRELOAD_KEY, Value::Bool(true)),
            Decorator::Constructor(args) => (CONSTRUCTOR_KEY, json!({ "args": args })),
            Decorator::Inject(id) => {
                let id = id
                    .as_ref()
                    .map(Identifier::as_str)
                    .or(target.member())
                    .unwrap_or_default();
                (INJECT_KEY, json!({ "identifier": id }))
            }
            Decorator::Config(path) => handler_entry(CONFIG_HANDLER, path.as_deref()),
            Decorator::Logger(name) => handler_entry(LOGGER_HANDLER, name.as_deref()),
            Decorator::App(ty) => handler_entry(APP_HANDLER, ty.as_ref().map(FrameworkType::as_str)),
            Decorator::Handler { key, identifier } => {
                (HANDLER_KEY, json!({ "key": key, "identifier": identifier }))
            }
            Decorator::Init => (INIT_KEY, json!({ "method": target.member() })),
            Decorator::Destroy => (DESTROY_KEY, json!({ "method": target.member() })),
        };

        // member-level metadata is keyed by member name; hooks are stored flat
        match self {
            Decorator::Init | Decorator::Destroy => {
                registry.save(&Target::Class(target.class()), key, value)
            }
            _ => registry.save(target, key, value),
        }
        Ok(())
    }
}

fn handler_entry(key: &'static str, identifier: Option<&str>) -> (&'static str, Value) {
    (HANDLER_KEY, json!({ "key": key, "identifier": identifier }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ClassKey;

    struct UserService;

    #[test]
    fn provide_defaults_to_camel_case_name() {
        let mut reg = MetadataRegistry::new();
        let class = ClassKey::of::<UserService>();
        Decorator::Provide(None)
            .apply(&mut reg, &Target::Class(class))
            .unwrap();
        assert_eq!(reg.get_own(&class, PROVIDE_KEY).unwrap()["identifier"], "userService");
    }

    #[test]
    fn wrong_target_kind_is_rejected() {
        let mut reg = MetadataRegistry::new();
        let class = ClassKey::of::<UserService>();

        let err = Decorator::Init
            .apply(&mut reg, &Target::Property(class, "start".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            DecoratorError::UnsupportedTarget {
                decorator: "Init",
                expected: TargetKind::Method,
                found: TargetKind::Property
            }
        ));
        assert!(Decorator::Inject(None)
            .apply(&mut reg, &Target::Class(class))
            .is_err());
        assert!(reg.get_own(&class, INJECT_KEY).is_none());
    }

    #[test]
    fn property_decorators_carry_their_handler_key() {
        let mut reg = MetadataRegistry::new();
        let class = ClassKey::of::<UserService>();
        Decorator::Config(Some("hello.a".into()))
            .apply(&mut reg, &Target::Property(class, "a".into()))
            .unwrap();
        Decorator::Logger(None)
            .apply(&mut reg, &Target::Property(class, "logger".into()))
            .unwrap();
        Decorator::Inject(None)
            .apply(&mut reg, &Target::Property(class, "repo".into()))
            .unwrap();
        Decorator::Init
            .apply(&mut reg, &Target::Method(class, "start".into()))
            .unwrap();

        let handlers = reg.get_own(&class, HANDLER_KEY).unwrap();
        assert_eq!(handlers["a"], json!({ "key": "config", "identifier": "hello.a" }));
        assert_eq!(handlers["logger"], json!({ "key": "logger", "identifier": null }));
        assert_eq!(reg.get_own(&class, INJECT_KEY).unwrap()["repo"]["identifier"], "repo");
        assert_eq!(reg.get_own(&class, INIT_KEY).unwrap()["method"], "start");
    }
}
