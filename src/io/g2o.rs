use super::*;
use crate::core::vertex::{PrvagState, VertexPrvag, REP_SIZE};
use crate::factors::{ImuPreIntegrationFactor, RECORD_LEN};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

/// Tag of a PRVAG vertex line: `VERTEX_PRVAG id <16 values>`.
pub const VERTEX_TAG: &str = "VERTEX_PRVAG";

/// Tag of an IMU edge line: `EDGE_PRVAG_IMU_PRE_INTEGRATION i j <139 values>`.
pub const EDGE_TAG: &str = "EDGE_PRVAG_IMU_PRE_INTEGRATION";

/// Files with more lines than this are parsed in parallel.
const PARALLEL_THRESHOLD: usize = 5000;

/// G2O loader for PRVAG graphs with IMU pre-integration edges
pub struct G2oLoader;

/// One parsed line, tagged with its 1-based line number.
enum ParsedItem {
    Vertex(VertexPrvag),
    Edge(usize, ImuPreIntegrationFactor),
}

impl GraphLoader for G2oLoader {
    fn load<P: AsRef<Path>>(path: P) -> Result<Graph, IoError> {
        let file = File::open(path.as_ref()).map_err(|e| {
            IoError::Io(e).log_with_source(format!("Failed to open G2O file: {:?}", path.as_ref()))
        })?;
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| {
                IoError::Io(e).log_with_source("Failed to memory-map G2O file".to_string())
            })?
        };
        let content = std::str::from_utf8(&mmap).map_err(|e| {
            IoError::Parse {
                line: 0,
                message: format!("Invalid UTF-8: {e}"),
            }
            .log()
        })?;

        let graph = Self::parse_content(content)?;
        info!(
            "Loaded {:?}: {} vertices, {} IMU edges",
            path.as_ref(),
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn write<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<(), IoError> {
        let file = File::create(path.as_ref()).map_err(|e| {
            IoError::Io(e).log_with_source(format!("Failed to create G2O file: {:?}", path.as_ref()))
        })?;
        let mut writer = BufWriter::new(file);
        Self::write_to(graph, &mut writer)?;
        writer.flush()?;

        info!(
            "Wrote {:?}: {} vertices, {} IMU edges",
            path.as_ref(),
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(())
    }
}

impl G2oLoader {
    /// Parse G2O content held in memory.
    ///
    /// Vertices are inserted before edges, so an edge may appear before the
    /// vertices it references.
    pub fn parse_content(content: &str) -> Result<Graph, IoError> {
        let lines: Vec<&str> = content.lines().collect();

        let items = if lines.len() > PARALLEL_THRESHOLD {
            Self::parse_parallel(&lines)?
        } else {
            Self::parse_sequential(&lines)?
        };

        let edge_count = items
            .iter()
            .filter(|item| matches!(item, ParsedItem::Edge(..)))
            .count();
        let mut graph = Graph::with_capacity(items.len() - edge_count, edge_count);
        let mut edges = Vec::with_capacity(edge_count);

        for item in items {
            match item {
                ParsedItem::Vertex(vertex) => {
                    let id = vertex.id();
                    if graph.vertex(id).is_some() {
                        return Err(IoError::DuplicateVertex { id }.log());
                    }
                    graph
                        .add_vertex(vertex)
                        .map_err(|_| IoError::DuplicateVertex { id })?;
                }
                ParsedItem::Edge(line, edge) => edges.push((line, edge)),
            }
        }

        for (line, edge) in edges {
            if let Some(id) = edge
                .vertices()
                .into_iter()
                .find(|id| graph.vertex(*id).is_none())
            {
                return Err(IoError::UnknownVertex { line, id }.log());
            }
            graph
                .add_edge(edge)
                .map_err(|e| IoError::Parse {
                    line,
                    message: e.to_string(),
                })?;
        }

        Ok(graph)
    }

    /// Sequential parsing for smaller files
    fn parse_sequential(lines: &[&str]) -> Result<Vec<ParsedItem>, IoError> {
        let mut items = Vec::with_capacity(lines.len());
        for (line_num, line) in lines.iter().enumerate() {
            if let Some(item) = Self::parse_line(line, line_num + 1)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Parallel parsing for larger files.
    ///
    /// Results are collected in line order before the first error is taken,
    /// so the reported error is the same one the sequential path returns.
    fn parse_parallel(lines: &[&str]) -> Result<Vec<ParsedItem>, IoError> {
        let results: Vec<Result<Option<ParsedItem>, IoError>> = lines
            .par_iter()
            .enumerate()
            .map(|(line_num, line)| Self::parse_line(line, line_num + 1))
            .collect();

        let items = results.into_iter().collect::<Result<Vec<_>, IoError>>()?;
        Ok(items.into_iter().flatten().collect())
    }

    /// Parse a single line. Empty lines, comments and unknown tags yield `None`.
    fn parse_line(line: &str, line_num: usize) -> Result<Option<ParsedItem>, IoError> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let field_count = line.split_whitespace().count();
        let mut reader = TokenReader::with_line(line, line_num);
        let tag = reader.next_token()?;

        let item = match tag {
            VERTEX_TAG => {
                if field_count < 2 + REP_SIZE {
                    return Err(IoError::MissingFields { line: line_num });
                }
                ParsedItem::Vertex(Self::parse_vertex(&mut reader)?)
            }
            EDGE_TAG => {
                if field_count < 3 + RECORD_LEN {
                    return Err(IoError::MissingFields { line: line_num });
                }
                ParsedItem::Edge(line_num, Self::parse_edge(&mut reader)?)
            }
            _ => return Ok(None),
        };

        if !reader.is_exhausted() {
            return Err(IoError::Parse {
                line: line_num,
                message: format!("trailing tokens after {tag} record"),
            }
            .log());
        }

        Ok(Some(item))
    }

    /// Parse the body of a VERTEX_PRVAG line
    pub fn parse_vertex(reader: &mut TokenReader<'_>) -> Result<VertexPrvag, IoError> {
        let id = reader.next_usize()?;
        let estimate = PrvagState::read(reader)?;
        Ok(VertexPrvag::new(id, estimate))
    }

    /// Parse the body of an EDGE_PRVAG_IMU_PRE_INTEGRATION line
    pub fn parse_edge(reader: &mut TokenReader<'_>) -> Result<ImuPreIntegrationFactor, IoError> {
        let from = reader.next_usize()?;
        let to = reader.next_usize()?;
        let mut edge = ImuPreIntegrationFactor::new(from, to);
        edge.read(reader)?;
        Ok(edge)
    }

    /// Write all vertices sorted by id, then all edges in insertion order.
    pub fn write_to<W: Write>(graph: &Graph, out: &mut W) -> Result<(), IoError> {
        for id in graph.vertex_ids() {
            if let Some(vertex) = graph.vertex(id) {
                write!(out, "{VERTEX_TAG} {id} ")?;
                vertex.estimate().write(out)?;
                writeln!(out)?;
            }
        }

        for edge in graph.edges() {
            let [from, to] = edge.vertices();
            write!(out, "{EDGE_TAG} {from} {to} ")?;
            edge.write(out)?;
            writeln!(out)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::SO3;
    use nalgebra::Vector3;
    use tempfile::NamedTempFile;

    fn sample_graph() -> Result<Graph, Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let gravity = Vector3::new(0.0, 0.0, -9.81);

        let states = [
            PrvagState::default(),
            PrvagState {
                position: Vector3::new(0.1, 0.0, -0.05),
                orientation: SO3::from_euler_angles(0.0, 0.0, 0.1),
                velocity: Vector3::new(1.0, 0.0, -0.98),
                ..PrvagState::default()
            },
            PrvagState {
                position: Vector3::new(0.2, 0.01, -0.2),
                orientation: SO3::from_euler_angles(0.01, 0.0, 0.2),
                velocity: Vector3::new(1.0, 0.1, -1.96),
                accel_bias: Vector3::new(0.001, 0.0, 0.0),
                ..PrvagState::default()
            },
        ];
        for (id, state) in states.iter().enumerate() {
            graph.add_vertex(VertexPrvag::new(id * 10, state.clone()))?;
        }
        for k in 0..2 {
            let mut edge = ImuPreIntegrationFactor::new(k * 10, (k + 1) * 10);
            edge.set_t(0.1);
            edge.set_gravity(gravity);
            edge.set_measurement(ImuPreIntegrationFactor::predict_measurement(
                &states[k],
                &states[k + 1],
                0.1,
                &gravity,
            ));
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    fn edge_line(from: usize, to: usize) -> String {
        let edge = ImuPreIntegrationFactor::new(from, to);
        format!("{EDGE_TAG} {from} {to} {}", edge.to_record())
    }

    #[test]
    fn test_parse_vertex_line() -> Result<(), Box<dyn std::error::Error>> {
        let content = "VERTEX_PRVAG 3 1 2 3 0 0 0 1 4 5 6 0 0 0 0 0 0\n";
        let graph = G2oLoader::parse_content(content)?;
        let vertex = graph.vertex(3).ok_or("vertex 3 missing")?;
        assert_eq!(vertex.estimate().position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(vertex.estimate().velocity, Vector3::new(4.0, 5.0, 6.0));
        Ok(())
    }

    #[test]
    fn test_skips_comments_blank_lines_and_unknown_tags() -> Result<(), Box<dyn std::error::Error>> {
        let content = format!(
            "# header\n\n{}\nVERTEX_SE2 0 1 2 3\n{}\n{}\n",
            "VERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0",
            "VERTEX_PRVAG 1 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0",
            edge_line(0, 1),
        );
        let graph = G2oLoader::parse_content(&content)?;
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        Ok(())
    }

    #[test]
    fn test_edge_before_vertices() -> Result<(), Box<dyn std::error::Error>> {
        let content = format!(
            "{}\nVERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\nVERTEX_PRVAG 1 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\n",
            edge_line(0, 1)
        );
        let graph = G2oLoader::parse_content(&content)?;
        assert_eq!(graph.edge_count(), 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_vertex() {
        let content = "VERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\nVERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\n";
        let result = G2oLoader::parse_content(content);
        assert!(matches!(result, Err(IoError::DuplicateVertex { id: 0 })));
    }

    #[test]
    fn test_unknown_vertex_reports_line() {
        let content = format!(
            "VERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\n{}\n",
            edge_line(0, 4)
        );
        let result = G2oLoader::parse_content(&content);
        assert!(matches!(
            result,
            Err(IoError::UnknownVertex { line: 2, id: 4 })
        ));
    }

    #[test]
    fn test_missing_fields_and_invalid_numbers() {
        let result = G2oLoader::parse_content("VERTEX_PRVAG 0 1 2 3\n");
        assert!(matches!(result, Err(IoError::MissingFields { line: 1 })));

        let result = G2oLoader::parse_content(
            "# comment\nVERTEX_PRVAG 0 0 0 x 0 0 0 1 0 0 0 0 0 0 0 0 0\n",
        );
        assert!(matches!(
            result,
            Err(IoError::InvalidNumber { line: 2, ref value }) if value == "x"
        ));

        let truncated: Vec<String> = edge_line(0, 1)
            .split(' ')
            .take(100)
            .map(str::to_string)
            .collect();
        let result = G2oLoader::parse_content(&truncated.join(" "));
        assert!(matches!(result, Err(IoError::MissingFields { line: 1 })));
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        let content = format!(
            "VERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\nVERTEX_PRVAG 1 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\n{} 42\n",
            edge_line(0, 1)
        );
        let result = G2oLoader::parse_content(&content);
        assert!(matches!(
            result,
            Err(IoError::Parse { line: 3, ref message }) if message.contains(EDGE_TAG)
        ));

        let result =
            G2oLoader::parse_content("VERTEX_PRVAG 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0 7\n");
        assert!(matches!(
            result,
            Err(IoError::Parse { line: 1, ref message }) if message.contains(VERTEX_TAG)
        ));

        // the record reader rejects the same record text
        let record = format!("{} 42", ImuPreIntegrationFactor::new(0, 1).to_record());
        assert!(matches!(
            ImuPreIntegrationFactor::from_record(&record),
            Err(IoError::Parse { .. })
        ));
    }

    #[test]
    fn test_write_sorts_vertices_then_edges() -> Result<(), Box<dyn std::error::Error>> {
        let graph = sample_graph()?;
        let mut out = Vec::new();
        G2oLoader::write_to(&graph, &mut out)?;
        let text = String::from_utf8(out)?;

        let tags: Vec<(&str, &str)> = text
            .lines()
            .filter_map(|line| {
                let mut parts = line.split(' ');
                Some((parts.next()?, parts.next()?))
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                (VERTEX_TAG, "0"),
                (VERTEX_TAG, "10"),
                (VERTEX_TAG, "20"),
                (EDGE_TAG, "0"),
                (EDGE_TAG, "10"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_file_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let graph = sample_graph()?;
        let file = NamedTempFile::new()?;
        G2oLoader::write(&graph, file.path())?;

        let loaded = G2oLoader::load(file.path())?;
        assert_eq!(loaded.vertex_count(), graph.vertex_count());
        assert_eq!(loaded.edges(), graph.edges());
        for id in graph.vertex_ids() {
            let original = graph.estimate(id)?;
            let reloaded = loaded.estimate(id)?;
            assert!(reloaded.minus(original).norm() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = G2oLoader::load("/nonexistent/path/graph.g2o");
        assert!(matches!(result, Err(IoError::Io(_))));
    }

    #[test]
    fn test_parallel_path_matches_sequential() -> Result<(), Box<dyn std::error::Error>> {
        let mut content = String::new();
        for id in 0..(PARALLEL_THRESHOLD + 10) {
            content.push_str(&format!(
                "VERTEX_PRVAG {id} {} 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0\n",
                id as f64 * 0.1
            ));
        }
        content.push_str(&edge_line(0, 1));
        content.push('\n');

        let graph = G2oLoader::parse_content(&content)?;
        assert_eq!(graph.vertex_count(), PARALLEL_THRESHOLD + 10);
        assert_eq!(graph.edge_count(), 1);
        let last = graph.estimate(PARALLEL_THRESHOLD + 9)?;
        assert!((last.position.x - (PARALLEL_THRESHOLD + 9) as f64 * 0.1).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_parallel_path_reports_first_bad_line() {
        let mut lines: Vec<String> = (0..(PARALLEL_THRESHOLD + 10))
            .map(|id| format!("VERTEX_PRVAG {id} 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 0"))
            .collect();
        lines[PARALLEL_THRESHOLD - 1] =
            format!("VERTEX_PRVAG {} 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 late", PARALLEL_THRESHOLD - 1);
        lines[9] = "VERTEX_PRVAG 9 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0 early".to_string();
        let content = lines.join("\n");

        for _ in 0..5 {
            let result = G2oLoader::parse_content(&content);
            assert!(matches!(
                result,
                Err(IoError::InvalidNumber { line: 10, ref value }) if value == "early"
            ));
        }
    }
}
