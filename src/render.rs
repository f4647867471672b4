use crate::{CellKind, NotebookError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

/// Render dispatch for the non-executing cell kinds. Each kind binds to
/// exactly one strategy, selected by its immutable tag; `Code` cells go
/// through the execution service instead (see `execution`).
pub fn render(kind: CellKind, content: &str) -> Result<String, NotebookError> {
    match kind {
        CellKind::Markdown => Ok(render_markdown(content)),
        CellKind::Graph => render_graph(content),
        CellKind::Image => render_image(content),
        CellKind::Code => Err(NotebookError::Render(
            "code cells run through the execution service".to_string(),
        )),
    }
}

/// Pure text -> HTML markup. Never fails; malformed markdown is still
/// markdown.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

// ========== Graph (DOT subset) ==========

const NODE_WIDTH: f32 = 120.0;
const NODE_HEIGHT: f32 = 40.0;
const LAYER_GAP: f32 = 180.0;
const ROW_GAP: f32 = 70.0;

/// Pure text -> SVG markup for a DOT subset: `graph`/`digraph` headers,
/// node statements, and `->`/`--` edge chains. Attribute blocks in square
/// brackets are accepted and ignored. Malformed input fails with a render
/// error whose message is shown verbatim; it never propagates further.
pub fn render_graph(text: &str) -> Result<String, NotebookError> {
    let parsed = parse_dot(text)?;
    Ok(layout_svg(&parsed))
}

struct ParsedGraph {
    nodes: Vec<String>,
    edges: Vec<(usize, usize)>,
    directed: bool,
}

fn parse_dot(text: &str) -> Result<ParsedGraph, NotebookError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NotebookError::Render("empty graph description".to_string()));
    }

    let header = Regex::new(r#"^\s*(?:strict\s+)?(di)?graph\s*(?:"[^"]*"|[A-Za-z0-9_]+)?\s*\{"#)
        .expect("static regex");
    let caps = header.captures(trimmed).ok_or_else(|| {
        NotebookError::Render("expected 'graph' or 'digraph' header".to_string())
    })?;
    let directed = caps.get(1).is_some();

    let open = trimmed.matches('{').count();
    let close = trimmed.matches('}').count();
    if open != close || !trimmed.ends_with('}') {
        return Err(NotebookError::Render(format!(
            "unbalanced braces: {open} opening, {close} closing"
        )));
    }

    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let body_end = trimmed.rfind('}').unwrap_or(trimmed.len());
    let body = &trimmed[body_start..body_end];

    // Attribute blocks carry no structure we lay out
    let attrs = Regex::new(r"\[[^\]]*\]").expect("static regex");
    let body = attrs.replace_all(body, "");

    let ident = Regex::new(r#""[^"]*"|[A-Za-z0-9_.]+"#).expect("static regex");

    let mut nodes: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    let intern = |name: &str, nodes: &mut Vec<String>, index: &mut HashMap<String, usize>| {
        let clean = name.trim_matches('"').to_string();
        *index.entry(clean.clone()).or_insert_with(|| {
            nodes.push(clean);
            nodes.len() - 1
        })
    };

    for statement in body.split([';', '\n']) {
        let statement = statement.trim();
        if statement.is_empty() || statement.contains('=') {
            continue;
        }
        // Nested subgraph braces contribute their statements, not a scope
        let statement = statement.trim_matches(&['{', '}'][..]).trim();
        if statement.is_empty() {
            continue;
        }
        let first_word = statement.split_whitespace().next().unwrap_or("");
        if matches!(
            first_word,
            "graph" | "node" | "edge" | "subgraph" | "strict" | "label" | "rankdir"
        ) {
            continue;
        }

        let has_edge = statement.contains("->") || statement.contains("--");
        let mut chain: Vec<usize> = Vec::new();
        for segment in statement.split("->").flat_map(|s| s.split("--")) {
            match ident.find(segment.trim()) {
                Some(m) => chain.push(intern(m.as_str(), &mut nodes, &mut index)),
                None if has_edge => {
                    return Err(NotebookError::Render(format!(
                        "dangling edge in statement '{statement}'"
                    )))
                }
                None => {}
            }
        }
        for pair in chain.windows(2) {
            edges.push((pair[0], pair[1]));
        }
    }

    Ok(ParsedGraph {
        nodes,
        edges,
        directed,
    })
}

/// Layered left-to-right layout: a node's column is the longest edge
/// distance from any root; rows fill top-down within a column.
fn layout_svg(graph: &ParsedGraph) -> String {
    let n = graph.nodes.len();
    let mut depth = vec![0usize; n];
    // Relaxation bounded by node count; cycles keep their first depth
    for _ in 0..n {
        let mut changed = false;
        for &(from, to) in &graph.edges {
            if depth[to] < depth[from] + 1 && depth[from] + 1 < n.max(1) {
                depth[to] = depth[from] + 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut row_in_layer: HashMap<usize, usize> = HashMap::new();
    let mut positions = Vec::with_capacity(n);
    for d in depth.iter().copied() {
        let row = row_in_layer.entry(d).or_insert(0);
        positions.push((
            20.0 + d as f32 * LAYER_GAP,
            20.0 + *row as f32 * ROW_GAP,
        ));
        *row += 1;
    }

    let width = positions
        .iter()
        .map(|(x, _)| x + NODE_WIDTH + 20.0)
        .fold(160.0f32, f32::max);
    let height = positions
        .iter()
        .map(|(_, y)| y + NODE_HEIGHT + 20.0)
        .fold(80.0f32, f32::max);

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.0}\" height=\"{height:.0}\" viewBox=\"0 0 {width:.0} {height:.0}\">"
    );
    if graph.directed {
        svg.push_str(
            "<defs><marker id=\"arrow\" markerWidth=\"8\" markerHeight=\"8\" refX=\"8\" refY=\"4\" orient=\"auto\"><path d=\"M0,0 L8,4 L0,8 z\"/></marker></defs>",
        );
    }
    for &(from, to) in &graph.edges {
        let (x1, y1) = positions[from];
        let (x2, y2) = positions[to];
        let marker = if graph.directed {
            " marker-end=\"url(#arrow)\""
        } else {
            ""
        };
        svg.push_str(&format!(
            "<line x1=\"{:.0}\" y1=\"{:.0}\" x2=\"{:.0}\" y2=\"{:.0}\" stroke=\"black\"{marker}/>",
            x1 + NODE_WIDTH,
            y1 + NODE_HEIGHT / 2.0,
            x2,
            y2 + NODE_HEIGHT / 2.0,
        ));
    }
    for (i, name) in graph.nodes.iter().enumerate() {
        let (x, y) = positions[i];
        svg.push_str(&format!(
            "<rect x=\"{x:.0}\" y=\"{y:.0}\" width=\"{NODE_WIDTH:.0}\" height=\"{NODE_HEIGHT:.0}\" rx=\"6\" fill=\"none\" stroke=\"black\"/><text x=\"{:.0}\" y=\"{:.0}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
            x + NODE_WIDTH / 2.0,
            y + NODE_HEIGHT / 2.0,
            escape_xml(name),
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ========== Image ==========

/// Resolve the content to image bytes (file path, data URI, or http(s)
/// URL), validate them by decoding, and produce a rendered image
/// reference. On any failure the render error names the unresolved
/// source.
pub fn render_image(content: &str) -> Result<String, NotebookError> {
    let source = content.trim();
    if source.is_empty() {
        return Err(NotebookError::Render(
            "Enter image URL or data URI or file path".to_string(),
        ));
    }
    let bytes = resolve_image_bytes(source)
        .map_err(|_| NotebookError::Render(format!("Failed to load image: {source}")))?;
    validate_image_bytes(source, &bytes)
}

fn resolve_image_bytes(source: &str) -> anyhow::Result<Vec<u8>> {
    if let Some(rest) = source.strip_prefix("data:") {
        let encoded = rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| anyhow::anyhow!("malformed data URI"))?;
        return Ok(BASE64.decode(encoded.trim())?);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let response = client.get(source).send()?.error_for_status()?;
        return Ok(response.bytes()?.to_vec());
    }
    Ok(std::fs::read(source)?)
}

/// Decode-validate the bytes and emit the image reference markup.
pub fn validate_image_bytes(source: &str, bytes: &[u8]) -> Result<String, NotebookError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|_| NotebookError::Render(format!("Failed to load image: {source}")))?;
    Ok(format!(
        "<img src=\"{}\" width=\"{}\" height=\"{}\" alt=\"{}\"/>",
        escape_xml(source),
        decoded.width(),
        decoded.height(),
        escape_xml(source),
    ))
}

// ========== Graph templates ==========

pub const GRAPH_TEMPLATE_KEYS: &[&str] = &["flow", "cluster", "seq", "deps", "state", "tree"];

/// Built-in DOT starting points insertable into a graph cell
pub fn graph_template(key: &str) -> Option<&'static str> {
    match key {
        "flow" => Some(
            "digraph G {\n  rankdir=TB;\n  node [shape=box, style=rounded];\n  Start -> \"Check\";\n  \"Check\" -> Done [label=\"Yes\"];\n  \"Check\" -> Retry [label=\"No\"];\n}",
        ),
        "cluster" => Some(
            "digraph Clustered {\n  graph [splines=true, bgcolor=\"#ffffff\"];\n  node  [shape=ellipse, fontname=\"Helvetica\"];\n  subgraph cluster_api { label=\"API\"; color=\"#88c\"; A1[label=\"Gateway\"]; A2[label=\"Auth\"]; }\n  subgraph cluster_db  { label=\"DB\";  color=\"#c88\"; D1[label=\"Postgres\"]; }\n  A1 -> A2 -> D1;\n}",
        ),
        "seq" => Some(
            "digraph Seq {\n  rankdir=LR; node [shape=box];\n  User -> API [label=\"GET /status\"];\n  API  -> User [label=\"200 OK\"];\n}",
        ),
        "deps" => Some(
            "digraph Deps {\n  rankdir=LR; node[shape=box, style=rounded];\n  A -> B -> C;\n  B -> D [label=\"fallback\"];\n}",
        ),
        "state" => Some(
            "digraph StateMachine {\n  rankdir=LR;\n  node [shape=circle];\n  OFF -> ON [label = \"turn on\"];\n  ON -> OFF [label = \"turn off\"];\n}",
        ),
        "tree" => Some(
            "digraph Tree {\n  node [shape=record];\n  root [label=\"<f0> | <f1> Root | <f2>\"];\n  c1 [label=\"<f0> | <f1> Child 1 | <f2>\"];\n  c2 [label=\"<f0> | <f1> Child 2 | <f2>\"];\n  root:f0 -> c1;\n  root:f2 -> c2;\n}",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_markdown_headings() {
        let html = render_markdown("# Title\n\nbody text");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<p>body text</p>"));
    }

    #[test]
    fn test_markdown_never_fails_on_garbage() {
        let html = render_markdown("*** [unclosed ](( ##");
        assert!(!html.is_empty());
    }

    #[test]
    fn test_graph_simple_digraph() {
        let svg = render_graph("digraph G { A -> B }").unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">A</text>"));
        assert!(svg.contains(">B</text>"));
        assert!(svg.contains("marker-end"));
    }

    #[test]
    fn test_graph_undirected_has_no_arrowheads() {
        let svg = render_graph("graph G { A -- B }").unwrap();
        assert!(!svg.contains("marker-end"));
    }

    #[test]
    fn test_graph_edge_chain() {
        let svg = render_graph("digraph Deps { A -> B -> C; }").unwrap();
        assert_eq!(svg.matches("<line").count(), 2);
    }

    #[test]
    fn test_graph_missing_header_is_render_error() {
        assert_matches!(render_graph("A -> B"), Err(NotebookError::Render(_)));
    }

    #[test]
    fn test_graph_unbalanced_braces_is_render_error() {
        let err = render_graph("digraph G { A -> B").unwrap_err();
        assert_matches!(err, NotebookError::Render(msg) if msg.contains("unbalanced"));
    }

    #[test]
    fn test_graph_empty_is_render_error() {
        assert_matches!(render_graph("   "), Err(NotebookError::Render(_)));
    }

    #[test]
    fn test_graph_attributes_ignored() {
        let svg = render_graph("digraph G { node [shape=box]; A -> B [label=\"x\"]; }").unwrap();
        assert!(svg.contains(">A</text>"));
        assert!(!svg.contains("shape"));
    }

    #[test]
    fn test_all_templates_render() {
        for key in GRAPH_TEMPLATE_KEYS {
            let tpl = graph_template(key).unwrap();
            render_graph(tpl).unwrap_or_else(|e| panic!("template {key} failed: {e}"));
        }
        assert_eq!(graph_template("nope"), None);
    }

    #[test]
    fn test_image_empty_source() {
        assert_matches!(render_image("  "), Err(NotebookError::Render(_)));
    }

    #[test]
    fn test_image_unresolvable_names_source() {
        let err = render_image("/no/such/image.png").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Render Error: Failed to load image: /no/such/image.png"
        );
    }

    #[test]
    fn test_image_data_uri_round_trip() {
        // 1x1 transparent PNG
        let png = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
        let markup = render_image(&format!("data:image/png;base64,{png}")).unwrap();
        assert!(markup.contains("width=\"1\""));
        assert!(markup.contains("height=\"1\""));
    }

    #[test]
    fn test_image_invalid_bytes() {
        let err = validate_image_bytes("blob", b"not an image").unwrap_err();
        assert_matches!(err, NotebookError::Render(msg) if msg.contains("blob"));
    }

    #[test]
    fn test_render_dispatch_code_is_refused() {
        assert_matches!(
            render(CellKind::Code, "print(1)"),
            Err(NotebookError::Render(_))
        );
    }
}
