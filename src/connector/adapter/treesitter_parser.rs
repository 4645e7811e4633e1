use std::path::Path;

use async_trait::async_trait;
use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Query, QueryCursor};

use crate::application::interfaces::{Declaration, ParsedFile, Parser as ParserTrait};
use crate::domain::{DomainError, Language};

pub struct TreeSitterParser {
    supported_languages: Vec<Language>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            supported_languages: vec![
                Language::Rust,
                Language::Python,
                Language::JavaScript,
                Language::TypeScript,
                Language::Go,
                Language::HCL,
                Language::Php,
            ],
        }
    }

    fn get_ts_language(&self, language: Language) -> Option<tree_sitter::Language> {
        match language {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::HCL => Some(tree_sitter_hcl::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Markdown | Language::Unknown => None,
        }
    }

    fn get_query_patterns(&self, language: Language) -> &'static str {
        match language {
            Language::Rust => {
                r#"
                (function_item name: (identifier) @name) @function
                (impl_item type: (type_identifier) @name) @impl
                (impl_item type: (generic_type type: (type_identifier) @name)) @impl
                (struct_item name: (type_identifier) @name) @struct
                (enum_item name: (type_identifier) @name) @enum
                (trait_item name: (type_identifier) @name) @trait
                (mod_item name: (identifier) @name) @module
                (const_item name: (identifier) @name) @constant
                (static_item name: (identifier) @name) @constant
                (type_item name: (type_identifier) @name) @typedef
                "#
            }
            Language::Python => {
                r#"
                (function_definition name: (identifier) @name) @function
                (class_definition name: (identifier) @name) @class
                "#
            }
            Language::JavaScript => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (identifier) @name) @class
                (method_definition name: (property_identifier) @name) @function
                "#
            }
            Language::TypeScript => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (type_identifier) @name) @class
                (method_definition name: (property_identifier) @name) @function
                (interface_declaration name: (type_identifier) @name) @interface
                (type_alias_declaration name: (type_identifier) @name) @typedef
                (export_statement (interface_declaration name: (type_identifier) @name)) @interface
                (export_statement (type_alias_declaration name: (type_identifier) @name)) @typedef
                "#
            }
            Language::Go => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (method_declaration name: (field_identifier) @name) @function
                (type_declaration (type_spec name: (type_identifier) @name)) @struct
                "#
            }
            Language::HCL => {
                r#"
                (block (identifier) @name) @block
                (attribute (identifier) @name) @constant
                "#
            }
            Language::Php => {
                r#"
                (function_definition name: (name) @name) @function
                (method_declaration name: (name) @name) @function
                (class_declaration name: (name) @name) @class
                (interface_declaration name: (name) @name) @interface
                (trait_declaration name: (name) @name) @trait
                (namespace_definition name: (namespace_name) @name) @module
                (enum_declaration name: (name) @name) @enum
                "#
            }
            Language::Markdown | Language::Unknown => "",
        }
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

/// One declaration captured from a tree-sitter match, before nesting is
/// reconstructed from byte ranges.
struct Capture {
    start_byte: usize,
    end_byte: usize,
    start_line: u32,
    end_line: u32,
    kind: String,
    name: Option<String>,
    content: String,
}

/// Rebuilds parent/child nesting (e.g. methods inside a class or impl block)
/// from a flat list of captures using byte-range containment, since
/// tree-sitter query matches arrive in match order, not document order.
fn captures_to_tree(mut captures: Vec<Capture>) -> Vec<Declaration> {
    captures.sort_by(|a, b| {
        a.start_byte
            .cmp(&b.start_byte)
            .then_with(|| b.end_byte.cmp(&a.end_byte))
    });

    let mut roots: Vec<Declaration> = Vec::new();
    // Stack of (end_byte, declaration) for currently-open ancestors, outermost first.
    let mut stack: Vec<(usize, Declaration)> = Vec::new();

    for capture in captures {
        while let Some((end_byte, _)) = stack.last() {
            if capture.start_byte >= *end_byte {
                let (_, finished) = stack.pop().unwrap();
                attach(&mut stack, &mut roots, finished);
            } else {
                break;
            }
        }

        let decl = Declaration::new(
            capture.kind,
            capture.name,
            capture.start_line,
            capture.end_line,
            capture.content,
        );
        stack.push((capture.end_byte, decl));
    }

    while let Some((_, finished)) = stack.pop() {
        attach(&mut stack, &mut roots, finished);
    }

    roots
}

fn attach(stack: &mut [(usize, Declaration)], roots: &mut Vec<Declaration>, decl: Declaration) {
    match stack.last_mut() {
        Some((_, parent)) => parent.children.push(decl),
        None => roots.push(decl),
    }
}

#[async_trait]
impl ParserTrait for TreeSitterParser {
    async fn parse(
        &self,
        file_path: &str,
        content: &str,
    ) -> Result<Option<ParsedFile>, DomainError> {
        let language = Language::from_path(Path::new(file_path));
        if !self.supports_language(language) {
            return Ok(None);
        }

        let ts_language = match self.get_ts_language(language) {
            Some(lang) => lang,
            None => return Ok(None),
        };

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| DomainError::parse(file_path, format!("failed to set language: {e}")))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| DomainError::parse(file_path, "tree-sitter failed to parse file"))?;

        let query_source = self.get_query_patterns(language);
        if query_source.is_empty() {
            return Ok(Some(ParsedFile {
                file_path: file_path.to_string(),
                language,
                root_declarations: Vec::new(),
            }));
        }

        let query = Query::new(&ts_language, query_source)
            .map_err(|e| DomainError::parse(file_path, format!("invalid query: {e}")))?;

        let mut cursor = QueryCursor::new();
        let text_bytes = content.as_bytes();
        let capture_names: Vec<&str> = query.capture_names().to_vec();

        let mut captures = Vec::new();
        let mut matches_iter = cursor.matches(&query, tree.root_node(), text_bytes);

        while let Some(query_match) = matches_iter.next() {
            let mut symbol_name: Option<String> = None;
            let mut main_node = None;
            let mut kind = "block";

            for capture in query_match.captures {
                let capture_name = capture_names
                    .get(capture.index as usize)
                    .copied()
                    .unwrap_or("");

                if capture_name == "name" {
                    symbol_name = Some(content[capture.node.byte_range()].to_string());
                } else {
                    main_node = Some(capture.node);
                    kind = capture_name;
                }
            }

            if let Some(node) = main_node {
                let node_content = content[node.byte_range()].to_string();
                if node_content.trim().len() < 10 {
                    continue;
                }

                captures.push(Capture {
                    start_byte: node.start_byte(),
                    end_byte: node.end_byte(),
                    start_line: node.start_position().row as u32 + 1,
                    end_line: node.end_position().row as u32 + 1,
                    kind: kind.to_string(),
                    name: symbol_name,
                    content: node_content,
                });
            }
        }

        let root_declarations = captures_to_tree(captures);
        debug!(
            "parsed {} top-level declaration(s) from {} ({:?})",
            root_declarations.len(),
            file_path,
            language
        );

        Ok(Some(ParsedFile {
            file_path: file_path.to_string(),
            language,
            root_declarations,
        }))
    }

    fn supported_languages(&self) -> Vec<Language> {
        self.supported_languages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(decls: &'a [Declaration], name: &str) -> Option<&'a Declaration> {
        for decl in decls {
            if decl.name.as_deref() == Some(name) {
                return Some(decl);
            }
            if let Some(found) = find(&decl.children, name) {
                return Some(found);
            }
        }
        None
    }

    #[tokio::test]
    async fn parses_rust_functions() {
        let parser = TreeSitterParser::new();
        let content = r#"
fn hello_world() {
    println!("Hello, world!");
}

fn add(a: i32, b: i32) -> i32 {
    a + b
}
"#;
        let parsed = parser
            .parse("test.rs", content)
            .await
            .unwrap()
            .expect("rust is supported");

        assert!(find(&parsed.root_declarations, "hello_world").is_some());
        assert!(find(&parsed.root_declarations, "add").is_some());
    }

    #[tokio::test]
    async fn nests_python_methods_under_their_class() {
        let parser = TreeSitterParser::new();
        let content = r#"
class Calculator:
    def add(self, a, b):
        return a + b

    def subtract(self, a, b):
        return a - b
"#;
        let parsed = parser
            .parse("calc.py", content)
            .await
            .unwrap()
            .expect("python is supported");

        let class_decl = find(&parsed.root_declarations, "Calculator").expect("class found");
        assert_eq!(class_decl.kind, "class");
        let method_names: Vec<&str> = class_decl
            .children
            .iter()
            .filter_map(|d| d.name.as_deref())
            .collect();
        assert!(method_names.contains(&"add"));
        assert!(method_names.contains(&"subtract"));
    }

    #[tokio::test]
    async fn parses_php_class_methods() {
        let parser = TreeSitterParser::new();
        let content = r#"
<?php
class Calculator {
    public function add($a, $b) {
        return $a + $b;
    }

    public function subtract($a, $b) {
        return $a - $b;
    }
}
"#;
        let parsed = parser
            .parse("calc.php", content)
            .await
            .unwrap()
            .expect("php is supported");

        let class_decl = find(&parsed.root_declarations, "Calculator").expect("class found");
        assert!(find(&class_decl.children, "add").is_some());
    }

    #[tokio::test]
    async fn unsupported_language_returns_none() {
        let parser = TreeSitterParser::new();
        let parsed = parser.parse("README.md", "# Title").await.unwrap();
        assert!(parsed.is_none());
    }

    #[tokio::test]
    async fn rust_impl_methods_nest_under_the_impl_block() {
        let parser = TreeSitterParser::new();
        let content = r#"
struct Circle {
    radius: f64,
}

impl Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}
"#;
        let parsed = parser
            .parse("shapes.rs", content)
            .await
            .unwrap()
            .expect("rust is supported");

        let impl_decl = parsed
            .root_declarations
            .iter()
            .find(|d| d.kind == "impl")
            .expect("impl block found");
        assert!(find(&impl_decl.children, "area").is_some());
    }
}
