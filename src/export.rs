use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::{Band, BandGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// GEXF 1.2, for Gephi.
    #[default]
    Gexf,
    /// GraphML, for yEd, Cytoscape, igraph.
    Graphml,
    /// Node-link JSON, for d3 and networkx.
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Gexf => "gexf",
            ExportFormat::Graphml => "graphml",
            ExportFormat::Json => "json",
        }
    }
}

/// Serialize `graph` into `out`. Nothing is filtered or reordered.
pub fn write<W: Write>(graph: &BandGraph, format: ExportFormat, out: &mut W) -> io::Result<()> {
    match format {
        ExportFormat::Gexf => write_gexf(graph, out),
        ExportFormat::Graphml => write_graphml(graph, out),
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &node_link(graph))?;
            writeln!(out)
        }
    }
}

/// Write to `path` through a temporary file in the same directory, so a
/// failed export never leaves a truncated file behind.
pub fn write_file(graph: &BandGraph, format: ExportFormat, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        write(graph, format, &mut out).with_context(|| format!("writing {}", path.display()))?;
        out.flush()
            .with_context(|| format!("writing {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("moving export into {}", path.display()))?;
    Ok(())
}

fn write_gexf<W: Write>(graph: &BandGraph, out: &mut W) -> io::Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, r#"<gexf xmlns="http://www.gexf.net/1.2draft" version="1.2">"#)?;
    writeln!(out, r#"  <meta><creator>ffo-graph</creator></meta>"#)?;
    writeln!(out, r#"  <graph mode="static" defaultedgetype="undirected">"#)?;
    writeln!(out, r#"    <attributes class="node" mode="static">"#)?;
    writeln!(out, r#"      <attribute id="0" title="country" type="string"/>"#)?;
    writeln!(out, r#"      <attribute id="1" title="followers" type="long"/>"#)?;
    writeln!(out, r#"      <attribute id="2" title="popularity" type="integer"/>"#)?;
    writeln!(out, "    </attributes>")?;
    writeln!(out, "    <nodes>")?;
    for b in graph.bands() {
        let name = xml_escape(&b.name);
        writeln!(out, r#"      <node id="{name}" label="{name}">"#)?;
        writeln!(out, "        <attvalues>")?;
        writeln!(
            out,
            r#"          <attvalue for="0" value="{}"/>"#,
            xml_escape(b.country_or_unknown())
        )?;
        if let Some(f) = b.followers {
            writeln!(out, r#"          <attvalue for="1" value="{f}"/>"#)?;
        }
        if let Some(p) = b.popularity {
            writeln!(out, r#"          <attvalue for="2" value="{p}"/>"#)?;
        }
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </node>")?;
    }
    writeln!(out, "    </nodes>")?;
    writeln!(out, "    <edges>")?;
    for (i, c) in graph.connections().iter().enumerate() {
        writeln!(
            out,
            r#"      <edge id="{i}" source="{}" target="{}" weight="{}"/>"#,
            xml_escape(&graph.band_at(c.a).name),
            xml_escape(&graph.band_at(c.b).name),
            c.weight
        )?;
    }
    writeln!(out, "    </edges>")?;
    writeln!(out, "  </graph>")?;
    writeln!(out, "</gexf>")
}

fn write_graphml<W: Write>(graph: &BandGraph, out: &mut W) -> io::Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#)?;
    writeln!(out, r#"  <key id="name" for="node" attr.name="name" attr.type="string"/>"#)?;
    writeln!(out, r#"  <key id="country" for="node" attr.name="country" attr.type="string"/>"#)?;
    writeln!(out, r#"  <key id="followers" for="node" attr.name="followers" attr.type="long"/>"#)?;
    writeln!(out, r#"  <key id="popularity" for="node" attr.name="popularity" attr.type="int"/>"#)?;
    writeln!(out, r#"  <key id="weight" for="edge" attr.name="weight" attr.type="int"/>"#)?;
    writeln!(out, r#"  <graph id="ffo" edgedefault="undirected">"#)?;
    for (i, b) in graph.bands().iter().enumerate() {
        writeln!(out, r#"    <node id="n{i}">"#)?;
        writeln!(out, r#"      <data key="name">{}</data>"#, xml_escape(&b.name))?;
        writeln!(
            out,
            r#"      <data key="country">{}</data>"#,
            xml_escape(b.country_or_unknown())
        )?;
        if let Some(f) = b.followers {
            writeln!(out, r#"      <data key="followers">{f}</data>"#)?;
        }
        if let Some(p) = b.popularity {
            writeln!(out, r#"      <data key="popularity">{p}</data>"#)?;
        }
        writeln!(out, "    </node>")?;
    }
    for (i, c) in graph.connections().iter().enumerate() {
        writeln!(
            out,
            r#"    <edge id="e{i}" source="n{}" target="n{}">"#,
            c.a, c.b
        )?;
        writeln!(out, r#"      <data key="weight">{}</data>"#, c.weight)?;
        writeln!(out, "    </edge>")?;
    }
    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")
}

fn node_link(graph: &BandGraph) -> Value {
    let nodes: Vec<Value> = graph.bands().iter().map(node_json).collect();
    let links: Vec<Value> = graph
        .connections()
        .iter()
        .map(|c| {
            json!({
                "source": graph.band_at(c.a).name,
                "target": graph.band_at(c.b).name,
                "weight": c.weight,
            })
        })
        .collect();
    json!({
        "directed": false,
        "multigraph": false,
        "nodes": nodes,
        "links": links,
    })
}

fn node_json(b: &Band) -> Value {
    let mut node = Map::new();
    node.insert("id".into(), json!(b.name));
    node.insert("country".into(), json!(b.country_or_unknown()));
    if let Some(f) = b.followers {
        node.insert("followers".into(), json!(f));
    }
    if let Some(p) = b.popularity {
        node.insert("popularity".into(), json!(p));
    }
    Value::Object(node)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
