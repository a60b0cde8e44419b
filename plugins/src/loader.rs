//! Structural discovery of commands inside a loaded module.
//!
//! A declared type becomes a command when it is concrete, carries command
//! metadata and exposes an entry point with [`EXECUTE_SIGNATURE`]. Nothing
//! else about the type is inspected.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use toolbelt_core::{
    CANCELLED_EXIT_CODE, CatalogEntry, Command, CommandGroup, GROUP_INDEX_TYPE, LoadError, Logger,
    Metadata, MetadataIndex, Origin, Outcome, PLUGIN_ROOT, Placement, ServiceContainer, Severity,
    TypeInfo,
};

use crate::artifact::{EXECUTE_SIGNATURE, ModuleRef, Step, TypeDecl};

/// Whether `decl` has the shape of a command.
pub fn qualifies(decl: &TypeDecl) -> bool {
    !decl.is_abstract
        && decl.metadata.is_some()
        && decl
            .entry
            .as_ref()
            .is_some_and(|entry| entry.signature == EXECUTE_SIGNATURE)
}

/// A command implemented by script steps. Keeps its module alive.
#[derive(Debug)]
pub struct ScriptCommand {
    type_info: TypeInfo,
    metadata: Metadata,
    steps: Vec<Step>,
    module: ModuleRef,
}

impl ScriptCommand {
    /// Checks that `decl` can run and binds it to `module`.
    pub fn instantiate(decl: &TypeDecl, module: &ModuleRef) -> Result<Self, LoadError> {
        let type_info = TypeInfo::new(decl.namespace.clone(), decl.type_name.clone());
        let (Some(metadata), Some(entry)) = (&decl.metadata, &decl.entry) else {
            return Err(LoadError::new(type_info.to_string(), "not a command type"));
        };
        for step in &entry.steps {
            if let Step::Exec { program, .. } = step {
                if program.trim().is_empty() {
                    return Err(LoadError::new(
                        type_info.to_string(),
                        "exec step has an empty program",
                    ));
                }
            }
        }
        Ok(Self {
            type_info,
            metadata: metadata.clone(),
            steps: entry.steps.clone(),
            module: module.clone(),
        })
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    pub fn module(&self) -> &ModuleRef {
        &self.module
    }
}

static ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([1-9@#])").expect("static regex must compile"));

/// Replaces `$1`..`$9` (missing ones become empty), `$@` (all arguments,
/// space separated) and `$#` (argument count).
pub fn substitute(text: &str, args: &[String]) -> String {
    ARG_RE
        .replace_all(text, |caps: &Captures<'_>| match &caps[1] {
            "@" => args.join(" "),
            "#" => args.len().to_string(),
            digit => digit
                .parse::<usize>()
                .ok()
                .and_then(|n| args.get(n - 1))
                .cloned()
                .unwrap_or_default(),
        })
        .into_owned()
}

/// Substitutes exec arguments. A token that is exactly `$@` expands to one
/// argument per invocation argument.
fn exec_args(templates: &[String], args: &[String]) -> Vec<String> {
    templates
        .iter()
        .flat_map(|template| {
            if template == "$@" {
                args.to_vec()
            } else {
                vec![substitute(template, args)]
            }
        })
        .collect()
}

#[async_trait]
impl Command for ScriptCommand {
    fn metadata(&self) -> Option<Metadata> {
        Some(self.metadata.clone())
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Outcome {
        let logger = services.resolve::<dyn Logger>();
        let say = |severity: Severity, text: &str| {
            if let Some(logger) = &logger {
                logger.log(severity, &substitute(text, args));
            }
        };

        for step in &self.steps {
            if cancel.is_cancelled() {
                return Outcome::from_exit_code(CANCELLED_EXIT_CODE);
            }
            match step {
                Step::Print { text } => say(Severity::Info, text),
                Step::Success { text } => say(Severity::Success, text),
                Step::Warn { text } => say(Severity::Warning, text),
                Step::Error { text } => say(Severity::Error, text),
                Step::Exec {
                    program,
                    args: templates,
                } => {
                    let program = substitute(program, args);
                    let argv = exec_args(templates, args);
                    let code = run_process(&program, &argv, cancel, logger.as_deref()).await;
                    if code != 0 {
                        return Outcome::from_exit_code(code);
                    }
                }
                Step::Exit { code } => return Outcome::from_exit_code(*code),
            }
        }
        Outcome::success()
    }
}

/// Runs `program` to completion with inherited stdio and returns its exit
/// code. Cancellation kills the child.
async fn run_process(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    logger: Option<&dyn Logger>,
) -> i32 {
    debug!(program, ?args, "launching process");
    let mut child = match tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(program, error = %err, "process failed to start");
            if let Some(logger) = logger {
                logger.error(&format!("Failed to start '{program}': {err}"));
            }
            return 1;
        }
    };

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code().unwrap_or(1),
            Err(err) => {
                warn!(program, error = %err, "waiting for process failed");
                1
            }
        },
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            CANCELLED_EXIT_CODE
        }
    }
}

/// Commands discovered in one module, not yet merged into a catalog.
#[derive(Debug, Default)]
pub struct LoadedCommands {
    pub commands: Vec<CatalogEntry>,
    pub groups: Vec<CommandGroup>,
    /// Types that qualified but could not be instantiated.
    pub skipped: Vec<LoadError>,
}

impl LoadedCommands {
    /// Number of leaf commands, grouped or not.
    pub fn command_count(&self) -> usize {
        self.commands.len() + self.groups.iter().map(CommandGroup::len).sum::<usize>()
    }
}

/// Discovers every command type of `module`.
///
/// Descriptors are memoized per loaded module, so equal type paths in
/// different units never share one. Types placed outside the plugin root are skipped.
pub fn load_module(module: &ModuleRef, index: &MetadataIndex) -> LoadedCommands {
    let unit = module.artifact.unit.as_str();
    let scope = format!("{unit}{}", module.id);
    let mut loaded = LoadedCommands::default();
    let mut groups: BTreeMap<String, CommandGroup> = BTreeMap::new();

    for decl in module.artifact.types.iter().filter(|decl| qualifies(decl)) {
        let command = match ScriptCommand::instantiate(decl, module) {
            Ok(command) => command,
            Err(err) => {
                warn!(unit, error = %err, "skipping plugin type");
                loaded.skipped.push(err);
                continue;
            }
        };
        let type_info = command.type_info.clone();
        let placement = type_info.placement(PLUGIN_ROOT);
        if placement == Placement::Outside {
            let err = LoadError::new(
                type_info.to_string(),
                format!("namespace is outside '{PLUGIN_ROOT}'"),
            );
            warn!(unit, error = %err, "skipping plugin type");
            loaded.skipped.push(err);
            continue;
        }

        let metadata = command.metadata.clone();
        let descriptor = index.describe_scoped(&scope, &type_info, || Some(metadata));
        let entry = CatalogEntry {
            type_info,
            descriptor,
            command: Arc::new(command),
            origin: Origin::Plugin,
        };

        match placement {
            Placement::Group(name) => {
                groups
                    .entry(name.clone())
                    .or_insert_with(|| {
                        let info = TypeInfo::new(entry.type_info.namespace.clone(), GROUP_INDEX_TYPE);
                        let descriptor =
                            index.describe_scoped(&scope, &info, || Some(Metadata::named(&name)));
                        CommandGroup::new(&name, descriptor, Origin::Plugin)
                    })
                    .push(entry);
            }
            _ => {
                if loaded.commands.iter().any(|e| e.descriptor.matches(entry.name())) {
                    warn!(unit, command = %entry.name(), "duplicate command name in unit, keeping the first");
                } else {
                    loaded.commands.push(entry);
                }
            }
        }
    }

    loaded.groups = groups.into_values().collect();
    debug!(
        unit,
        commands = loaded.command_count(),
        skipped = loaded.skipped.len(),
        "module loaded"
    );
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, EntryPoint, ModuleRegistry};
    use toolbelt_core::RecordingLogger;

    fn decl(namespace: &str, type_name: &str, steps: Vec<Step>) -> TypeDecl {
        TypeDecl {
            type_name: type_name.into(),
            namespace: namespace.into(),
            is_abstract: false,
            metadata: Some(Metadata::default()),
            entry: Some(EntryPoint::execute(steps)),
        }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn services() -> (ServiceContainer, Arc<RecordingLogger>) {
        let logger = Arc::new(RecordingLogger::new());
        let mut services = ServiceContainer::new();
        services.register_singleton::<dyn Logger>(logger.clone());
        (services, logger)
    }

    #[test]
    fn test_qualification_is_structural() {
        let good = decl("plugins", "Hello", vec![]);
        assert!(qualifies(&good));

        let mut abstract_decl = good.clone();
        abstract_decl.is_abstract = true;
        assert!(!qualifies(&abstract_decl));

        let mut no_metadata = good.clone();
        no_metadata.metadata = None;
        assert!(!qualifies(&no_metadata));

        let mut wrong_signature = good.clone();
        wrong_signature.entry = Some(EntryPoint {
            signature: "execute() -> outcome".into(),
            steps: vec![],
        });
        assert!(!qualifies(&wrong_signature));

        let mut no_entry = good;
        no_entry.entry = None;
        assert!(!qualifies(&no_entry));
    }

    #[test]
    fn test_substitution() {
        let a = args(&["one", "two"]);
        assert_eq!(substitute("$1-$2-$3", &a), "one-two-");
        assert_eq!(substitute("all: $@ ($# args)", &a), "all: one two (2 args)");
        assert_eq!(substitute("cost $0 and $$", &a), "cost $0 and $$");
        assert_eq!(
            exec_args(&args(&["-c", "$@", "x$1"]), &a),
            args(&["-c", "one", "two", "xone"])
        );
    }

    #[test]
    fn test_load_module_splits_groups_and_skips_bad_types() {
        let registry = ModuleRegistry::new();
        let module = registry.register(Artifact::new(
            "mixed",
            vec![
                decl("plugins", "Hello", vec![]),
                decl("plugins.office", "Word", vec![]),
                decl("plugins.office", "Excel", vec![]),
                decl("elsewhere", "Stray", vec![]),
                decl(
                    "plugins",
                    "Broken",
                    vec![Step::Exec {
                        program: " ".into(),
                        args: vec![],
                    }],
                ),
            ],
        ));
        let index = MetadataIndex::new();
        let loaded = load_module(&module, &index);

        assert_eq!(loaded.commands.len(), 1);
        assert_eq!(loaded.commands[0].name(), "hello");
        assert_eq!(loaded.commands[0].origin, Origin::Plugin);
        assert_eq!(loaded.groups.len(), 1);
        assert_eq!(loaded.groups[0].name(), "office");
        assert_eq!(loaded.groups[0].descriptor().name, "office");
        assert_eq!(loaded.groups[0].len(), 2);
        assert_eq!(loaded.command_count(), 3);
        assert_eq!(loaded.skipped.len(), 2);

        // Three commands hold the module; the test holds one more.
        assert_eq!(registry.live_references(module.id), Some(4));
        drop(loaded);
        assert_eq!(registry.live_references(module.id), Some(1));
    }

    #[tokio::test]
    async fn test_steps_log_with_substitution_and_exit_code() {
        let registry = ModuleRegistry::new();
        let module = registry.register(Artifact::new("greet", vec![]));
        let command = ScriptCommand::instantiate(
            &decl(
                "plugins",
                "Greet",
                vec![
                    Step::Print {
                        text: "Hello $1".into(),
                    },
                    Step::Success { text: "done".into() },
                    Step::Warn { text: "$# args".into() },
                    Step::Exit { code: 4 },
                    Step::Error {
                        text: "never".into(),
                    },
                ],
            ),
            &module,
        )
        .unwrap();

        let (services, logger) = services();
        let outcome = command
            .execute(&args(&["world"]), &services, &CancellationToken::new())
            .await;

        assert_eq!(outcome, Outcome::from_exit_code(4));
        assert_eq!(logger.messages(Severity::Info), vec!["Hello world"]);
        assert_eq!(logger.messages(Severity::Success), vec!["done"]);
        assert_eq!(logger.messages(Severity::Warning), vec!["1 args"]);
        assert!(logger.messages(Severity::Error).is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_reports_error() {
        let registry = ModuleRegistry::new();
        let module = registry.register(Artifact::new("bad", vec![]));
        let command = ScriptCommand::instantiate(
            &decl(
                "plugins",
                "Bad",
                vec![Step::Exec {
                    program: "definitely-not-a-real-program-xyz".into(),
                    args: vec![],
                }],
            ),
            &module,
        )
        .unwrap();

        let (services, logger) = services();
        let outcome = command
            .execute(&[], &services, &CancellationToken::new())
            .await;
        assert!(!outcome.is_success());
        assert!(logger.contains("Failed to start 'definitely-not-a-real-program-xyz'"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_running_process() {
        let registry = ModuleRegistry::new();
        let module = registry.register(Artifact::new("slow", vec![]));
        let command = ScriptCommand::instantiate(
            &decl(
                "plugins",
                "Slow",
                vec![
                    Step::Exec {
                        program: "sleep".into(),
                        args: args(&["5"]),
                    },
                    Step::Print {
                        text: "finished".into(),
                    },
                ],
            ),
            &module,
        )
        .unwrap();

        let (services, logger) = services();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = command.execute(&[], &services, &cancel).await;
        assert_eq!(outcome.exit_code, Some(CANCELLED_EXIT_CODE));
        assert!(!logger.contains("finished"));
    }
}
