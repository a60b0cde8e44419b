//! Front end of the plugin script language.
//!
//! Line oriented. Top level: `use <module>;`, `namespace <path>;` and
//! `[abstract] command <Name> {` / `routine <Name> {` blocks closed by a
//! lone `}`. Inside a command block, metadata lines (`name`, `description`,
//! `params`, `keywords`, `hidden`, `rule`) and steps (`print`, `success`,
//! `warn`, `error`, `exec`, `exit`). A `#` at the start of a token begins a
//! comment. Every error is collected; parsing continues on the next line.

use std::collections::HashSet;

use toolbelt_core::{Metadata, PLUGIN_ROOT, ValidationRule};

use crate::artifact::{EntryPoint, Step, TypeDecl};

/// Error at a 1-based line of the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Self::Word(s) | Self::Str(s) => s,
        }
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.peek() {
                        Some('"') | Some('\\') => text.extend(chars.next()),
                        _ => text.push('\\'),
                    },
                    _ => text.push(c),
                }
            }
            if !closed {
                return Err("unterminated string literal".to_string());
            }
            tokens.push(Token::Str(text));
            continue;
        }
        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Module {
    Console,
    Process,
    Validation,
}

impl Module {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "console" => Some(Self::Console),
            "process" => Some(Self::Process),
            "validation" => Some(Self::Validation),
            _ => None,
        }
    }

    fn import(self) -> &'static str {
        match self {
            Self::Console => "use console;",
            Self::Process => "use process;",
            Self::Validation => "use validation;",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Command { is_abstract: bool },
    Routine,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    name: String,
    namespace: String,
    line: usize,
    metadata: Metadata,
    steps: Vec<Step>,
    exited: bool,
}

impl Block {
    fn finish(self) -> TypeDecl {
        let (is_abstract, metadata) = match self.kind {
            BlockKind::Command { is_abstract } => (is_abstract, Some(self.metadata)),
            BlockKind::Routine => (false, None),
        };
        TypeDecl {
            type_name: self.name,
            namespace: self.namespace,
            is_abstract,
            metadata,
            entry: Some(EntryPoint::execute(self.steps)),
        }
    }
}

struct Parser {
    namespace: String,
    imports: HashSet<&'static str>,
    block: Option<Block>,
    types: Vec<TypeDecl>,
    names: HashSet<String>,
    errors: Vec<ParseError>,
}

/// Parses a whole unit into type declarations.
///
/// # Examples
///
/// ```
/// use toolbelt_plugins::script::parse;
///
/// let source = "use console;\nnamespace plugins.net;\ncommand Hello {\n    print \"hi $1\"\n}\n";
/// let types = parse(source).unwrap();
/// assert_eq!(types[0].type_name, "Hello");
/// assert_eq!(types[0].namespace, "plugins.net");
///
/// let errors = parse("command Broken {\n    shout \"x\"\n}\n").unwrap_err();
/// assert_eq!(errors[0].line, 2);
/// ```
pub fn parse(source: &str) -> Result<Vec<TypeDecl>, Vec<ParseError>> {
    let mut parser = Parser {
        namespace: PLUGIN_ROOT.to_string(),
        imports: HashSet::new(),
        block: None,
        types: Vec::new(),
        names: HashSet::new(),
        errors: Vec::new(),
    };

    // Imports apply to the whole unit regardless of position.
    for line in source.lines() {
        let Ok(tokens) = tokenize(line) else {
            continue;
        };
        if let Some((Token::Word(kw), rest)) = tokens.split_first() {
            if kw == "use" {
                if let Some(module) = statement_argument(rest).and_then(Module::parse) {
                    parser.imports.insert(module.import());
                }
            }
        }
    }

    for (i, line) in source.lines().enumerate() {
        parser.line(i + 1, line);
    }

    if let Some(block) = parser.block.take() {
        parser.error(block.line, format!("block '{}' is never closed", block.name));
    }

    if parser.errors.is_empty() {
        Ok(parser.types)
    } else {
        Err(parser.errors)
    }
}

impl Parser {
    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.errors.push(ParseError {
            line,
            message: message.into(),
        });
    }

    fn line(&mut self, line: usize, text: &str) {
        let tokens = match tokenize(text) {
            Ok(tokens) => tokens,
            Err(message) => return self.error(line, message),
        };
        let Some((Token::Word(keyword), rest)) = tokens.split_first() else {
            if let Some(token) = tokens.first() {
                self.error(line, format!("unknown statement '{}'", token.text()));
            }
            return;
        };

        if self.block.is_some() {
            self.block_line(line, keyword, rest);
        } else {
            self.top_level_line(line, keyword, rest);
        }
    }

    fn top_level_line(&mut self, line: usize, keyword: &str, rest: &[Token]) {
        match keyword {
            "use" => match statement_argument(rest) {
                Some(name) if Module::parse(name).is_some() => {}
                Some(name) => self.error(line, format!("unknown module '{name}'")),
                None => self.error(line, "expected 'use <module>;'"),
            },
            "namespace" => match statement_argument(rest) {
                Some(path) if !path.is_empty() => self.namespace = path.to_string(),
                _ => self.error(line, "expected 'namespace <path>;'"),
            },
            "abstract" => match rest.split_first() {
                Some((Token::Word(kw), header)) if kw == "command" => {
                    self.open(line, BlockKind::Command { is_abstract: true }, header)
                }
                _ => self.error(line, "expected 'abstract command <Name> {'"),
            },
            "command" => self.open(line, BlockKind::Command { is_abstract: false }, rest),
            "routine" => self.open(line, BlockKind::Routine, rest),
            "}" => self.error(line, "unexpected '}'"),
            other => self.error(line, format!("unknown statement '{other}'")),
        }
    }

    fn open(&mut self, line: usize, kind: BlockKind, header: &[Token]) {
        let name = match header {
            [Token::Word(name), Token::Word(brace)] if brace == "{" => name.clone(),
            [Token::Word(name)] if name.len() > 1 && name.ends_with('{') => {
                name.trim_end_matches('{').to_string()
            }
            _ => {
                // Still open the block so its body is not parsed as top level.
                self.error(line, "expected '<Name> {' after block keyword");
                header.first().map(|t| t.text().to_string()).unwrap_or_default()
            }
        };
        if !name.is_empty() {
            if !is_identifier(&name) {
                self.error(line, format!("invalid type name '{name}'"));
            } else if !self.names.insert(name.clone()) {
                self.error(line, format!("duplicate type '{name}'"));
            }
        }
        self.block = Some(Block {
            kind,
            name,
            namespace: self.namespace.clone(),
            line,
            metadata: Metadata::default(),
            steps: Vec::new(),
            exited: false,
        });
    }

    fn block_line(&mut self, line: usize, keyword: &str, rest: &[Token]) {
        if keyword == "}" {
            if !rest.is_empty() {
                self.error(line, "unexpected text after '}'");
            }
            if let Some(block) = self.block.take() {
                self.types.push(block.finish());
            }
            return;
        }

        let is_command = matches!(
            self.block.as_ref().map(|b| b.kind),
            Some(BlockKind::Command { .. })
        );
        match keyword {
            "name" | "description" | "params" | "keywords" | "hidden" | "rule" if !is_command => {
                self.error(line, format!("'{keyword}' is only allowed in command blocks"));
            }
            "name" | "description" | "params" | "keywords" => {
                if let Some(value) = self.string_argument(line, keyword, rest) {
                    self.set_metadata(keyword, value);
                }
            }
            "hidden" => {
                if !rest.is_empty() {
                    self.error(line, "'hidden' takes no arguments");
                }
                if let Some(block) = self.block.as_mut() {
                    block.metadata.hidden = true;
                }
            }
            "rule" => {
                if let Some(rule) = self.rule(line, rest) {
                    if let Some(block) = self.block.as_mut() {
                        block.metadata.rules.push(rule);
                    }
                }
            }
            "print" | "success" | "warn" | "error" => {
                self.require(line, keyword, Module::Console);
                if let Some(text) = self.string_argument(line, keyword, rest) {
                    let step = match keyword {
                        "print" => Step::Print { text },
                        "success" => Step::Success { text },
                        "warn" => Step::Warn { text },
                        _ => Step::Error { text },
                    };
                    self.push_step(line, step);
                }
            }
            "exec" => {
                self.require(line, keyword, Module::Process);
                match rest.split_first() {
                    Some((program, args)) => self.push_step(
                        line,
                        Step::Exec {
                            program: program.text().to_string(),
                            args: args.iter().map(|t| t.text().to_string()).collect(),
                        },
                    ),
                    None => self.error(line, "expected a program after 'exec'"),
                }
            }
            "exit" => match rest {
                [token] => match token.text().parse::<i32>() {
                    Ok(code) => {
                        self.push_step(line, Step::Exit { code });
                        if let Some(block) = self.block.as_mut() {
                            block.exited = true;
                        }
                    }
                    Err(_) => self.error(line, format!("invalid number '{}'", token.text())),
                },
                _ => self.error(line, "expected 'exit <code>'"),
            },
            other => self.error(line, format!("unknown statement '{other}'")),
        }
    }

    fn require(&mut self, line: usize, keyword: &str, module: Module) {
        if !self.imports.contains(module.import()) {
            self.error(
                line,
                format!("'{keyword}' requires '{}'", module.import()),
            );
        }
    }

    fn push_step(&mut self, line: usize, step: Step) {
        let exited = self.block.as_ref().is_some_and(|b| b.exited);
        if exited {
            return self.error(line, "unreachable statement after 'exit'");
        }
        if let Some(block) = self.block.as_mut() {
            block.steps.push(step);
        }
    }

    fn set_metadata(&mut self, keyword: &str, value: String) {
        let Some(block) = self.block.as_mut() else {
            return;
        };
        let metadata = &mut block.metadata;
        match keyword {
            "name" => metadata.name = Some(value),
            "description" => metadata.description = Some(value),
            "params" => metadata.params = Some(value),
            _ => metadata.keywords = Some(value),
        }
    }

    fn string_argument(&mut self, line: usize, keyword: &str, rest: &[Token]) -> Option<String> {
        match rest {
            [Token::Str(value)] => Some(value.clone()),
            _ => {
                self.error(line, format!("expected a string after '{keyword}'"));
                None
            }
        }
    }

    fn rule(&mut self, line: usize, rest: &[Token]) -> Option<ValidationRule> {
        self.require(line, "rule", Module::Validation);
        let words: Vec<&str> = rest.iter().map(Token::text).collect();
        let count = |n: &str, make: fn(usize) -> ValidationRule| {
            n.parse::<usize>()
                .map(make)
                .map_err(|_| format!("invalid number '{n}'"))
        };
        let parsed = match words.as_slice() {
            ["numeric"] => Ok(ValidationRule::AllNumeric),
            ["min", n] => count(*n, ValidationRule::MinCount),
            ["max", n] => count(*n, ValidationRule::MaxCount),
            ["exact", n] => count(*n, ValidationRule::ExactCount),
            [kind, ..] => Err(format!("unknown rule '{kind}'")),
            [] => Err("expected 'rule min|max|exact <n>' or 'rule numeric'".to_string()),
        };
        match parsed {
            Ok(rule) => Some(rule),
            Err(message) => {
                self.error(line, message);
                None
            }
        }
    }
}

/// Argument of a `;`-terminated top-level statement.
fn statement_argument(rest: &[Token]) -> Option<&str> {
    match rest {
        [Token::Word(arg)] => arg.strip_suffix(';').map(str::trim),
        [Token::Word(arg), Token::Word(semi)] if semi == ";" => Some(arg.as_str()),
        _ => None,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRELUDE: &str = "use console;\nuse process;\nuse validation;\n";

    fn parse_ok(body: &str) -> Vec<TypeDecl> {
        parse(&format!("{PRELUDE}{body}")).unwrap()
    }

    fn parse_err(body: &str) -> Vec<ParseError> {
        parse(&format!("{PRELUDE}{body}")).unwrap_err()
    }

    #[test]
    fn test_full_command_block() {
        let types = parse_ok(
            r#"namespace plugins.run;
# a comment
command Speedtest {
    name "speedtest"
    description "Runs a \"speed\" test"
    params "<server>"
    keywords "network speed"
    hidden
    rule min 1
    rule numeric
    print "Testing $1"   # trailing comment
    exec ping -c 1 $1
    exit 3
}
"#,
        );
        assert_eq!(types.len(), 1);
        let decl = &types[0];
        assert_eq!(decl.type_name, "Speedtest");
        assert_eq!(decl.namespace, "plugins.run");
        assert!(!decl.is_abstract);

        let metadata = decl.metadata.as_ref().unwrap();
        assert_eq!(metadata.name.as_deref(), Some("speedtest"));
        assert_eq!(metadata.description.as_deref(), Some("Runs a \"speed\" test"));
        assert_eq!(metadata.params.as_deref(), Some("<server>"));
        assert_eq!(metadata.keywords.as_deref(), Some("network speed"));
        assert!(metadata.hidden);
        assert_eq!(
            metadata.rules,
            vec![ValidationRule::MinCount(1), ValidationRule::AllNumeric]
        );

        let steps = &decl.entry.as_ref().unwrap().steps;
        assert_eq!(
            steps,
            &vec![
                Step::Print {
                    text: "Testing $1".into()
                },
                Step::Exec {
                    program: "ping".into(),
                    args: vec!["-c".into(), "1".into(), "$1".into()],
                },
                Step::Exit { code: 3 },
            ]
        );
    }

    #[test]
    fn test_abstract_and_routine_blocks() {
        let types = parse_ok("abstract command Base {\n}\nroutine Helper {\n    print \"x\"\n}\n");
        assert!(types[0].is_abstract);
        assert!(types[0].metadata.is_some());
        assert!(types[1].metadata.is_none());
        assert!(types[1].entry.is_some());
    }

    #[test]
    fn test_namespace_applies_to_later_blocks() {
        let types = parse_ok(
            "command A {\n}\nnamespace plugins.office;\ncommand B {\n}\n",
        );
        assert_eq!(types[0].namespace, "plugins");
        assert_eq!(types[1].namespace, "plugins.office");
    }

    #[test]
    fn test_dollar_hash_is_not_a_comment() {
        let types = parse_ok("command Count {\n    exec echo $# $@\n}\n");
        let steps = &types[0].entry.as_ref().unwrap().steps;
        assert_eq!(
            steps[0],
            Step::Exec {
                program: "echo".into(),
                args: vec!["$#".into(), "$@".into()],
            }
        );
    }

    #[test]
    fn test_all_errors_are_collected_with_lines() {
        let errors = parse_err(
            "command A {\n    shout \"x\"\n    rule min x\n    print \"open\n}\ncommand A {\n}\n",
        );
        let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![5, 6, 7, 9]);
        assert!(errors[0].message.contains("unknown statement 'shout'"));
        assert!(errors[1].message.contains("invalid number 'x'"));
        assert!(errors[2].message.contains("unterminated string"));
        assert!(errors[3].message.contains("duplicate type 'A'"));
    }

    #[test]
    fn test_missing_import_is_an_error() {
        let errors = parse("command A {\n    exec ls\n}\n").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
        assert!(errors[0].message.contains("use process;"));
    }

    #[test]
    fn test_unclosed_block_reported_at_header() {
        let errors = parse_err("command Open {\n    print \"x\"\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
        assert!(errors[0].message.contains("never closed"));
    }

    #[test]
    fn test_statements_after_exit_are_rejected() {
        let errors = parse_err("command A {\n    exit 0\n    print \"late\"\n}\n");
        assert!(errors[0].message.contains("unreachable"));
    }

    #[test]
    fn test_routine_rejects_metadata() {
        let errors = parse_err("routine R {\n    name \"r\"\n}\n");
        assert!(errors[0].message.contains("only allowed in command blocks"));
    }

    #[test]
    fn test_empty_exec_program_string_compiles() {
        let types = parse_ok("command A {\n    exec \"\"\n}\n");
        assert_eq!(
            types[0].entry.as_ref().unwrap().steps[0],
            Step::Exec {
                program: String::new(),
                args: vec![],
            }
        );
    }
}
