//! Source analysis using tree-sitter.
//!
//! Parses a single TypeScript/JavaScript file into graph nodes (file, class,
//! function, method, interface, type, enum, variable, import) and the edges
//! between them (contains, exports, imports, extends, implements).
//!
//! Invalidation is file-level: any edit to a file recomputes all of its nodes
//! and edges.
//!
//! Method ids are `file#method:name` with no class qualifier, so same-named
//! methods of two classes in one file share a node. The last class wins the
//! `parent` metadata, and both classes get a `contains` edge to that node.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tree_sitter::{Language, Node as TsNode, Parser};

use crate::error::ParseError;
use crate::types::{compute_checksum, language_for_path, Edge, EdgeType, Node, NodeType};

/// One import statement (or re-export with a source) found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    /// Module specifier as written, e.g. `./util` or `react`
    pub specifier: String,
    /// Local names bound by the import
    pub names: Vec<String>,
    pub line: usize,
}

impl ImportInfo {
    /// Relative specifiers (`./x`, `../x`) are the only ones resolved to files.
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../")
    }
}

/// Output of analyzing one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub imports: Vec<ImportInfo>,
    /// Exported symbol names (`default` for anonymous default exports)
    pub exports: Vec<String>,
    /// SHA256 hex of the file content
    pub checksum: String,
}

/// Syntax node kinds the analyzer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyntaxKind {
    Import,
    Export,
    Class,
    Interface,
    Function,
    Method,
    TypeAlias,
    Enum,
    Variables,
    Other,
}

impl SyntaxKind {
    fn of(node: &TsNode) -> Self {
        match node.kind() {
            "import_statement" => SyntaxKind::Import,
            "export_statement" => SyntaxKind::Export,
            "class_declaration" | "abstract_class_declaration" => SyntaxKind::Class,
            "interface_declaration" => SyntaxKind::Interface,
            "function_declaration" | "generator_function_declaration" => SyntaxKind::Function,
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                SyntaxKind::Method
            }
            "type_alias_declaration" => SyntaxKind::TypeAlias,
            "enum_declaration" => SyntaxKind::Enum,
            "lexical_declaration" | "variable_declaration" => SyntaxKind::Variables,
            _ => SyntaxKind::Other,
        }
    }
}

/// Stateless analyzer; a parser is created per call so the analyzer can be
/// shared across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceAnalyzer;

impl SourceAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Get supported file extensions.
    pub fn supported_extensions() -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx"]
    }

    /// Check if a path has a supported extension.
    pub fn is_supported(path: &str) -> bool {
        path.rsplit_once('.')
            .map(|(_, ext)| Self::supported_extensions().contains(&ext))
            .unwrap_or(false)
    }

    fn language_for(file_path: &str) -> Option<Language> {
        let ext = file_path.rsplit_once('.').map(|(_, ext)| ext)?;
        match ext {
            "ts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            "js" | "jsx" => Some(tree_sitter_javascript::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Parse one file into nodes, edges, imports, exports and a checksum.
    pub fn parse(&self, file_path: &str, content: &str) -> Result<AnalysisResult, ParseError> {
        let language = Self::language_for(file_path)
            .ok_or_else(|| ParseError::new(file_path, "unsupported file type"))?;
        let language_name = language_for_path(file_path).unwrap_or("unknown");

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ParseError::new(file_path, e.to_string()))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ParseError::new(file_path, "parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return Err(ParseError::new(
                file_path,
                format!("syntax error near line {}", line),
            ));
        }

        let mut extraction = Extraction::new(file_path, language_name, content);
        let mut cursor = root.walk();
        let statements: Vec<TsNode> = root.named_children(&mut cursor).collect();
        for statement in statements {
            extraction.visit_statement(statement, statement, false);
        }

        let result = extraction.finish();
        debug!(
            "Analyzed {}: {} nodes, {} edges, {} imports",
            file_path,
            result.nodes.len(),
            result.edges.len(),
            result.imports.len()
        );
        Ok(result)
    }
}

/// Heritage reference awaiting resolution against the file's own symbols.
struct PendingHeritage {
    source_id: String,
    edge_type: EdgeType,
    target_name: String,
}

struct Extraction<'a> {
    file_path: &'a str,
    language: &'a str,
    source: &'a str,
    file_id: String,
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    imports: Vec<ImportInfo>,
    exports: Vec<String>,
    heritage: Vec<PendingHeritage>,
}

impl<'a> Extraction<'a> {
    fn new(file_path: &'a str, language: &'a str, source: &'a str) -> Self {
        let line_count = source.lines().count().max(1);
        let file_node = Node::new(NodeType::File, file_path, file_path, language)
            .with_range(1, line_count)
            .with_meta("loc", line_count as i64);
        let file_id = file_node.id.clone();

        let mut extraction = Self {
            file_path,
            language,
            source,
            file_id,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            heritage: Vec::new(),
        };
        extraction.push_node(file_node);
        extraction
    }

    fn text(&self, node: TsNode) -> &'a str {
        &self.source[node.byte_range()]
    }

    fn field_text(&self, node: TsNode, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|child| self.text(child).to_string())
    }

    /// Insert a node; a later node with the same id replaces the earlier one.
    fn push_node(&mut self, node: Node) {
        if let Some(&idx) = self.node_index.get(&node.id) {
            debug!("Node id collision in {}: {}", self.file_path, node.id);
            self.nodes[idx] = node;
        } else {
            self.node_index.insert(node.id.clone(), self.nodes.len());
            self.nodes.push(node);
        }
    }

    fn push_edge(&mut self, source: &str, target: &str, edge_type: EdgeType) {
        let edge = Edge::new(source, target, edge_type);
        if !self.edges.iter().any(|e| e.id == edge.id) {
            self.edges.push(edge);
        }
    }

    fn symbol(&self, node_type: NodeType, name: &str, decl: TsNode, doc_anchor: TsNode) -> Node {
        let mut symbol = Node::new(node_type, name, self.file_path, self.language).with_range(
            decl.start_position().row + 1,
            decl.end_position().row + 1,
        );
        if let Some(sig) = self.signature(decl) {
            symbol = symbol.with_signature(sig);
        }
        if let Some(doc) = self.docstring(doc_anchor) {
            symbol = symbol.with_docstring(doc);
        }
        symbol
    }

    /// Register a top-level symbol: contains edge, plus exports edge when exported.
    fn add_top_level(&mut self, symbol: Node, exported: bool) -> String {
        let id = symbol.id.clone();
        let name = symbol.name.clone();
        let symbol = symbol.with_meta("exported", exported);
        self.push_node(symbol);

        let file_id = self.file_id.clone();
        self.push_edge(&file_id, &id, EdgeType::Contains);
        if exported {
            self.push_edge(&file_id, &id, EdgeType::Exports);
            if !self.exports.contains(&name) {
                self.exports.push(name);
            }
        }
        id
    }

    fn visit_statement(&mut self, node: TsNode, doc_anchor: TsNode, exported: bool) {
        match SyntaxKind::of(&node) {
            SyntaxKind::Import => self.visit_import(node),
            SyntaxKind::Export => self.visit_export(node),
            SyntaxKind::Class => self.visit_class(node, doc_anchor, exported),
            SyntaxKind::Interface => self.visit_interface(node, doc_anchor, exported),
            SyntaxKind::Function => {
                if let Some(name) = self.field_text(node, "name") {
                    let symbol = self.symbol(NodeType::Function, &name, node, doc_anchor);
                    self.add_top_level(symbol, exported);
                }
            }
            SyntaxKind::TypeAlias => {
                if let Some(name) = self.field_text(node, "name") {
                    let symbol = self.symbol(NodeType::Type, &name, node, doc_anchor);
                    self.add_top_level(symbol, exported);
                }
            }
            SyntaxKind::Enum => {
                if let Some(name) = self.field_text(node, "name") {
                    let symbol = self.symbol(NodeType::Enum, &name, node, doc_anchor);
                    self.add_top_level(symbol, exported);
                }
            }
            SyntaxKind::Variables => self.visit_variables(node, doc_anchor, exported),
            SyntaxKind::Method | SyntaxKind::Other => {}
        }
    }

    fn visit_import(&mut self, node: TsNode) {
        let Some(specifier) = node.child_by_field_name("source").map(|s| self.string_value(s))
        else {
            return;
        };

        let mut names = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() == "import_clause" {
                self.collect_import_names(child, &mut names);
            }
        }

        self.record_import(node, specifier, names);
    }

    fn record_import(&mut self, node: TsNode, specifier: String, names: Vec<String>) {
        let line = node.start_position().row + 1;
        let import_node = Node::new(NodeType::Import, &specifier, self.file_path, self.language)
            .with_range(line, node.end_position().row + 1)
            .with_meta("specifier", specifier.as_str());
        let import_id = import_node.id.clone();
        self.push_node(import_node);

        let file_id = self.file_id.clone();
        self.push_edge(&file_id, &import_id, EdgeType::Imports);

        self.imports.push(ImportInfo {
            specifier,
            names,
            line,
        });
    }

    fn collect_import_names(&self, node: TsNode, names: &mut Vec<String>) {
        match node.kind() {
            "identifier" => names.push(self.text(node).to_string()),
            "import_specifier" => {
                let local = node
                    .child_by_field_name("alias")
                    .or_else(|| node.child_by_field_name("name"));
                if let Some(local) = local {
                    names.push(self.text(local).to_string());
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.collect_import_names(child, names);
                }
            }
        }
    }

    fn visit_export(&mut self, node: TsNode) {
        if let Some(decl) = node.child_by_field_name("declaration") {
            self.visit_statement(decl, node, true);
        }

        // `export { a, b }` and `export { a } from './x'`
        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.children(&mut cursor).collect();
        let mut is_default = false;
        let mut re_exported = Vec::new();
        for child in &children {
            match child.kind() {
                "default" => is_default = true,
                "export_clause" => {
                    let mut inner = child.walk();
                    for item in child.named_children(&mut inner) {
                        let exported_name = item
                            .child_by_field_name("alias")
                            .or_else(|| item.child_by_field_name("name"))
                            .map(|n| self.text(n).to_string());
                        if let Some(name) = exported_name {
                            re_exported.push(name);
                        }
                    }
                }
                _ => {}
            }
        }

        if is_default && node.child_by_field_name("declaration").is_none() {
            re_exported.push("default".to_string());
        }
        for name in &re_exported {
            if !self.exports.contains(name) {
                self.exports.push(name.clone());
            }
        }

        if let Some(source) = node.child_by_field_name("source") {
            let specifier = self.string_value(source);
            self.record_import(node, specifier, re_exported);
        }
    }

    fn visit_class(&mut self, node: TsNode, doc_anchor: TsNode, exported: bool) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let mut class = self.symbol(NodeType::Class, &name, node, doc_anchor);
        if node.kind() == "abstract_class_declaration" {
            class = class.with_meta("abstract", true);
        }

        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        let mut extends = Vec::new();
        let mut implements = Vec::new();
        for child in &children {
            if child.kind() == "class_heritage" {
                self.collect_heritage(*child, &mut extends, &mut implements);
            }
        }
        if !extends.is_empty() {
            class = class.with_meta("extends", extends.join(", "));
        }
        if !implements.is_empty() {
            class = class.with_meta("implements", implements.join(", "));
        }

        let class_id = self.add_top_level(class, exported);
        for target_name in extends {
            self.heritage.push(PendingHeritage {
                source_id: class_id.clone(),
                edge_type: EdgeType::Extends,
                target_name,
            });
        }
        for target_name in implements {
            self.heritage.push(PendingHeritage {
                source_id: class_id.clone(),
                edge_type: EdgeType::Implements,
                target_name,
            });
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_members(body, &class_id, &name);
        }
    }

    fn collect_heritage(&self, heritage: TsNode, extends: &mut Vec<String>, implements: &mut Vec<String>) {
        let mut cursor = heritage.walk();
        let clauses: Vec<TsNode> = heritage.named_children(&mut cursor).collect();
        for clause in clauses {
            match clause.kind() {
                "extends_clause" => {
                    let mut inner = clause.walk();
                    for value in clause.children_by_field_name("value", &mut inner) {
                        extends.push(type_name(self.text(value)));
                    }
                }
                "implements_clause" => {
                    let mut inner = clause.walk();
                    for ty in clause.named_children(&mut inner) {
                        implements.push(type_name(self.text(ty)));
                    }
                }
                // JavaScript grammar: `class_heritage` holds the expression directly
                _ => extends.push(type_name(self.text(clause))),
            }
        }
    }

    fn visit_members(&mut self, body: TsNode, parent_id: &str, parent_name: &str) {
        let mut cursor = body.walk();
        let members: Vec<TsNode> = body.named_children(&mut cursor).collect();
        for member in members {
            if SyntaxKind::of(&member) != SyntaxKind::Method {
                continue;
            }
            let Some(name) = self.field_text(member, "name") else {
                continue;
            };
            let method = self
                .symbol(NodeType::Method, &name, member, member)
                .with_meta("parent", parent_name);
            let method_id = method.id.clone();
            self.push_node(method);
            self.push_edge(parent_id, &method_id, EdgeType::Contains);
        }
    }

    fn visit_interface(&mut self, node: TsNode, doc_anchor: TsNode, exported: bool) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let mut interface = self.symbol(NodeType::Interface, &name, node, doc_anchor);

        let mut extends = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for child in &children {
            if child.kind() == "extends_type_clause" {
                let mut inner = child.walk();
                for ty in child.named_children(&mut inner) {
                    extends.push(type_name(self.text(ty)));
                }
            }
        }
        if !extends.is_empty() {
            interface = interface.with_meta("extends", extends.join(", "));
        }

        let interface_id = self.add_top_level(interface, exported);
        for target_name in extends {
            self.heritage.push(PendingHeritage {
                source_id: interface_id.clone(),
                edge_type: EdgeType::Extends,
                target_name,
            });
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_members(body, &interface_id, &name);
        }
    }

    fn visit_variables(&mut self, node: TsNode, doc_anchor: TsNode, exported: bool) {
        let mut cursor = node.walk();
        let declarators: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for declarator in declarators {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            // Destructuring patterns do not name a single symbol
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(name_node).to_string();

            let is_function = declarator
                .child_by_field_name("value")
                .map(|value| {
                    matches!(
                        value.kind(),
                        "arrow_function" | "function_expression" | "function"
                    )
                })
                .unwrap_or(false);
            let node_type = if is_function {
                NodeType::Function
            } else {
                NodeType::Variable
            };

            let symbol = self.symbol(node_type, &name, node, doc_anchor);
            self.add_top_level(symbol, exported);
        }
    }

    /// Text of a declaration up to its body, whitespace collapsed.
    fn signature(&self, decl: TsNode) -> Option<String> {
        let content = self.text(decl);
        let head = match content.find('{') {
            Some(pos) => &content[..pos],
            None => content.lines().next()?,
        };
        let sig = head.split_whitespace().collect::<Vec<_>>().join(" ");
        if sig.is_empty() {
            None
        } else {
            Some(sig)
        }
    }

    /// JSDoc block immediately preceding the declaration.
    fn docstring(&self, anchor: TsNode) -> Option<String> {
        let prev = anchor.prev_named_sibling()?;
        if prev.kind() != "comment" {
            return None;
        }
        // Must be adjacent, not separated by blank lines
        if prev.end_position().row + 1 < anchor.start_position().row {
            return None;
        }
        let raw = self.text(prev);
        if !raw.starts_with("/**") {
            return None;
        }

        let body = raw.trim_start_matches("/**").trim_end_matches("*/");
        let doc = body
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if doc.is_empty() {
            None
        } else {
            Some(doc)
        }
    }

    fn string_value(&self, node: TsNode) -> String {
        self.text(node)
            .trim_matches(|c| c == '"' || c == '\'' || c == '`')
            .to_string()
    }

    fn finish(mut self) -> AnalysisResult {
        let heritage = std::mem::take(&mut self.heritage);
        for pending in heritage {
            let target = self.nodes.iter().find(|n| {
                n.name == pending.target_name
                    && matches!(n.node_type, NodeType::Class | NodeType::Interface)
            });
            if let Some(target) = target {
                let target_id = target.id.clone();
                self.push_edge(&pending.source_id, &target_id, pending.edge_type);
            }
        }

        AnalysisResult {
            checksum: compute_checksum(self.source),
            nodes: self.nodes,
            edges: self.edges,
            imports: self.imports,
            exports: self.exports,
        }
    }
}

/// Strip type arguments from a heritage reference: `Base<T>` -> `Base`.
fn type_name(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
}

/// Line (1-indexed) of the first error or missing node.
fn first_error_line(node: TsNode) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<TsNode> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'r>(result: &'r AnalysisResult, node_type: NodeType, name: &str) -> Option<&'r Node> {
        result
            .nodes
            .iter()
            .find(|n| n.node_type == node_type && n.name == name)
    }

    #[test]
    fn test_supported_extensions() {
        assert!(SourceAnalyzer::is_supported("src/a.ts"));
        assert!(SourceAnalyzer::is_supported("src/a.tsx"));
        assert!(SourceAnalyzer::is_supported("src/a.js"));
        assert!(!SourceAnalyzer::is_supported("src/a.rs"));
        assert!(!SourceAnalyzer::is_supported("README"));
    }

    #[test]
    fn test_parse_typescript_symbols() {
        let source = r#"
import { helper } from './util';
import React from 'react';

/** A user record. */
export interface User {
    id: number;
    greet(): string;
}

export type UserId = number;

export enum Role {
    Admin,
    Member,
}

export class UserService implements Repository {
    constructor(private readonly db: Db) {}

    find(id: UserId): User | undefined {
        return helper(id);
    }
}

function internal() {
    return 1;
}

export const makeService = () => new UserService(db);
const LIMIT = 10;
"#;

        let result = SourceAnalyzer::new().parse("src/user.ts", source).unwrap();

        let file = find(&result, NodeType::File, "src/user.ts").unwrap();
        assert_eq!(file.id, Node::file_id("src/user.ts"));

        let user = find(&result, NodeType::Interface, "User").unwrap();
        assert!(user.is_exported());
        assert_eq!(user.docstring.as_deref(), Some("A user record."));

        assert!(find(&result, NodeType::Type, "UserId").is_some());
        assert!(find(&result, NodeType::Enum, "Role").is_some());

        let service = find(&result, NodeType::Class, "UserService").unwrap();
        assert!(service.is_exported());
        assert_eq!(
            service.meta("implements").and_then(|v| v.as_str()),
            Some("Repository")
        );

        let method = find(&result, NodeType::Method, "find").unwrap();
        assert_eq!(method.meta("parent").and_then(|v| v.as_str()), Some("UserService"));
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Contains
            && e.source_id == service.id
            && e.target_id == method.id));

        let internal = find(&result, NodeType::Function, "internal").unwrap();
        assert!(!internal.is_exported());

        assert!(find(&result, NodeType::Function, "makeService").unwrap().is_exported());
        assert!(find(&result, NodeType::Variable, "LIMIT").is_some());

        assert_eq!(result.imports.len(), 2);
        assert_eq!(result.imports[0].specifier, "./util");
        assert_eq!(result.imports[0].names, vec!["helper".to_string()]);
        assert!(result.imports[0].is_relative());
        assert!(!result.imports[1].is_relative());

        for name in ["User", "UserId", "Role", "UserService", "makeService"] {
            assert!(result.exports.contains(&name.to_string()), "missing export {}", name);
        }
        assert!(!result.exports.contains(&"internal".to_string()));
    }

    #[test]
    fn test_local_heritage_edges() {
        let source = r#"
class Derived extends Base<number> {}
class Base<T> {}
interface Shape {}
interface Square extends Shape {}
"#;
        let result = SourceAnalyzer::new().parse("shapes.ts", source).unwrap();

        let derived = find(&result, NodeType::Class, "Derived").unwrap();
        let base = find(&result, NodeType::Class, "Base").unwrap();
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Extends
            && e.source_id == derived.id
            && e.target_id == base.id));

        let square = find(&result, NodeType::Interface, "Square").unwrap();
        let shape = find(&result, NodeType::Interface, "Shape").unwrap();
        assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Extends
            && e.source_id == square.id
            && e.target_id == shape.id));
    }

    #[test]
    fn test_same_method_name_across_classes_shares_node() {
        let source = r#"
class First {
    run() { return 1; }
}
class Second {
    run() { return 2; }
}
"#;
        let result = SourceAnalyzer::new().parse("jobs.ts", source).unwrap();

        let methods: Vec<&Node> = result
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Method && n.name == "run")
            .collect();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].meta("parent").and_then(|v| v.as_str()), Some("Second"));

        for class in ["First", "Second"] {
            let class_id = &find(&result, NodeType::Class, class).unwrap().id;
            assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Contains
                && &e.source_id == class_id
                && e.target_id == methods[0].id));
        }
    }

    #[test]
    fn test_re_export_is_recorded_as_import() {
        let source = "export { a, b as c } from './parts';\n";
        let result = SourceAnalyzer::new().parse("index.ts", source).unwrap();
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.imports[0].specifier, "./parts");
        assert!(result.exports.contains(&"a".to_string()));
        assert!(result.exports.contains(&"c".to_string()));
    }

    #[test]
    fn test_parse_javascript() {
        let source = r#"
import { x } from '../lib/x.js';
export class Animal extends Base {
    speak() { return 1; }
}
export function main() {}
"#;
        let result = SourceAnalyzer::new().parse("src/app.js", source).unwrap();
        let animal = find(&result, NodeType::Class, "Animal").unwrap();
        assert_eq!(animal.language, "javascript");
        assert_eq!(animal.meta("extends").and_then(|v| v.as_str()), Some("Base"));
        assert!(find(&result, NodeType::Method, "speak").is_some());
        assert!(find(&result, NodeType::Function, "main").unwrap().is_exported());
    }

    #[test]
    fn test_malformed_source_is_parse_error() {
        let err = SourceAnalyzer::new()
            .parse("broken.ts", "export class {{{ function (")
            .unwrap_err();
        assert_eq!(err.file_path, "broken.ts");
        assert!(err.reason.contains("syntax error"));
    }

    #[test]
    fn test_unsupported_file_is_parse_error() {
        let err = SourceAnalyzer::new().parse("main.rs", "fn main() {}").unwrap_err();
        assert!(err.reason.contains("unsupported"));
    }

    #[test]
    fn test_checksum_and_ids_stable_across_parses() {
        let source = "export function a() {}\nexport class B {}\n";
        let analyzer = SourceAnalyzer::new();
        let first = analyzer.parse("x.ts", source).unwrap();
        let second = analyzer.parse("x.ts", source).unwrap();
        assert_eq!(first.checksum, second.checksum);
        let ids1: Vec<_> = first.nodes.iter().map(|n| n.id.clone()).collect();
        let ids2: Vec<_> = second.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids1, ids2);
    }
}
