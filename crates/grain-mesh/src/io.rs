//! Text and VTK file I/O.
//!
//! Inputs are whitespace-separated record files whose first record is a
//! count. Outputs are legacy ASCII VTK files and plain-text tables.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::quality::QualityReport;
use crate::tetmesh::VolumeMesh;
use crate::types::{GrainId, Node, NodeId, SurfaceMesh, SurfaceTriangle, EXTERIOR};
use crate::voxel::VoxelGrid;

const VTK_HEADER: &str = "# vtk DataFile Version 2.0";

/// One line of the node input file.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: u32,
    pub numgrains: u32,
    pub position: Point3<f64>,
}

/// One line of the triangle input file.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleRecord {
    pub id: u32,
    pub nodes: [u32; 3],
    /// Edge ids as given in the input; carried but unused.
    pub edges: [i64; 3],
    /// Adjacent grains; negative means outside the domain.
    pub grains: [i64; 2],
}

/// Line-oriented record reader that tracks line numbers for errors.
struct Records<'a, R> {
    lines: io::Lines<R>,
    path: &'a Path,
    line: usize,
}

impl<'a, R: BufRead> Records<'a, R> {
    fn new(reader: R, path: &'a Path) -> Self {
        Self {
            lines: reader.lines(),
            path,
            line: 0,
        }
    }

    fn parse_error(&self, details: impl Into<String>) -> MeshError {
        MeshError::ParseError {
            path: self.path.to_path_buf(),
            line: self.line,
            details: details.into(),
        }
    }

    /// Next non-blank line split into tokens, or `None` at end of input.
    fn next_record(&mut self) -> MeshResult<Option<Vec<String>>> {
        for line in self.lines.by_ref() {
            self.line += 1;
            let line = line.map_err(|e| MeshError::IoRead {
                path: self.path.to_path_buf(),
                source: e,
            })?;
            let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
            if !tokens.is_empty() {
                return Ok(Some(tokens));
            }
        }
        Ok(None)
    }

    fn expect_record(&mut self, width: usize, what: &str) -> MeshResult<Vec<String>> {
        let tokens = self
            .next_record()?
            .ok_or_else(|| self.parse_error(format!("unexpected end of file, expected {}", what)))?;
        if tokens.len() < width {
            return Err(self.parse_error(format!(
                "expected {} fields for {}, found {}",
                width,
                what,
                tokens.len()
            )));
        }
        Ok(tokens)
    }

    fn field<T: std::str::FromStr>(&self, token: &str, name: &str) -> MeshResult<T> {
        token
            .parse()
            .map_err(|_| self.parse_error(format!("invalid {} '{}'", name, token)))
    }

    fn count(&mut self, what: &str) -> MeshResult<usize> {
        let tokens = self.expect_record(1, what)?;
        self.field(&tokens[0], what)
    }
}

fn open(path: &Path) -> MeshResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| MeshError::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufReader::new(file))
}

/// Parse node records `<id> <numgrains> <x> <y> <z>`.
pub fn parse_nodes<R: BufRead>(reader: R, path: &Path) -> MeshResult<Vec<NodeRecord>> {
    let mut records = Records::new(reader, path);
    let count = records.count("node count")?;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let t = records.expect_record(5, "node record")?;
        nodes.push(NodeRecord {
            id: records.field(&t[0], "node id")?,
            numgrains: records.field(&t[1], "grain count")?,
            position: Point3::new(
                records.field(&t[2], "x")?,
                records.field(&t[3], "y")?,
                records.field(&t[4], "z")?,
            ),
        });
    }
    Ok(nodes)
}

/// Parse triangle records `<id> <n1> <n2> <n3> <e1> <e2> <e3> <g1> <g2>`.
pub fn parse_triangles<R: BufRead>(reader: R, path: &Path) -> MeshResult<Vec<TriangleRecord>> {
    let mut records = Records::new(reader, path);
    let count = records.count("triangle count")?;
    let mut triangles = Vec::with_capacity(count);
    for _ in 0..count {
        let t = records.expect_record(9, "triangle record")?;
        triangles.push(TriangleRecord {
            id: records.field(&t[0], "triangle id")?,
            nodes: [
                records.field(&t[1], "node id")?,
                records.field(&t[2], "node id")?,
                records.field(&t[3], "node id")?,
            ],
            edges: [
                records.field(&t[4], "edge id")?,
                records.field(&t[5], "edge id")?,
                records.field(&t[6], "edge id")?,
            ],
            grains: [
                records.field(&t[7], "grain id")?,
                records.field(&t[8], "grain id")?,
            ],
        });
    }
    Ok(triangles)
}

/// Parse tessellator output: a count, then `<n1> <n2> <n3> <n4>` per line.
///
/// Missing or truncated output is an external tool failure. Indices beyond
/// `node_count` are malformed input.
pub fn parse_tets<R: BufRead>(
    reader: R,
    path: &Path,
    node_count: usize,
) -> MeshResult<Vec<[NodeId; 4]>> {
    let mut records = Records::new(reader, path);
    let count = match records.next_record()? {
        Some(t) => records.field::<usize>(&t[0], "tetrahedron count")?,
        None => {
            return Err(MeshError::external(format!(
                "{} is empty",
                path.display()
            )))
        }
    };

    let mut tets = Vec::with_capacity(count);
    for i in 0..count {
        let t = match records.next_record()? {
            Some(t) if t.len() >= 4 => t,
            Some(_) => return Err(records.parse_error("expected 4 node indices")),
            None => {
                return Err(MeshError::external(format!(
                    "{} declares {} tetrahedra but ends after {}",
                    path.display(),
                    count,
                    i
                )))
            }
        };
        let mut nodes = [0; 4];
        for (slot, token) in nodes.iter_mut().zip(t.iter()) {
            let index: NodeId = records.field(token, "node index")?;
            if index as usize >= node_count {
                return Err(MeshError::malformed(format!(
                    "{} line {}: node index {} out of range (0..{})",
                    path.display(),
                    records.line,
                    index,
                    node_count
                )));
            }
            *slot = index;
        }
        tets.push(nodes);
    }
    Ok(tets)
}

/// Read tessellator output from a file.
pub fn read_tets(path: &Path, node_count: usize) -> MeshResult<Vec<[NodeId; 4]>> {
    let file = File::open(path).map_err(|e| {
        MeshError::external(format!("cannot open {}: {}", path.display(), e))
    })?;
    parse_tets(BufReader::new(file), path, node_count)
}

/// Assemble a surface mesh from parsed records.
///
/// Node and triangle ids must be unique and lie in `0..count`. Negative
/// grain ids become [`EXTERIOR`] and flag the triangle as on the edge.
/// Zero-area triangles are loaded killed.
pub fn assemble_surface(
    node_records: Vec<NodeRecord>,
    triangle_records: Vec<TriangleRecord>,
    num_grains: Option<u32>,
) -> MeshResult<SurfaceMesh> {
    let node_count = node_records.len();
    let mut slots: Vec<Option<Node>> = vec![None; node_count];
    for rec in node_records {
        let slot = slots.get_mut(rec.id as usize).ok_or_else(|| {
            MeshError::malformed(format!(
                "node id {} out of range (0..{})",
                rec.id, node_count
            ))
        })?;
        if slot.is_some() {
            return Err(MeshError::malformed(format!("duplicate node id {}", rec.id)));
        }
        *slot = Some(Node::surface(rec.position, rec.numgrains));
    }
    // Unique ids in 0..count fill every slot.
    let nodes: Vec<Node> = slots.into_iter().flatten().collect();

    let max_grain = triangle_records
        .iter()
        .flat_map(|t| t.grains)
        .max()
        .unwrap_or(0)
        .max(0) as u32;
    let num_grains = num_grains.unwrap_or(max_grain);

    let tri_count = triangle_records.len();
    let mut tri_slots: Vec<Option<SurfaceTriangle>> = vec![None; tri_count];
    for rec in triangle_records {
        for &n in &rec.nodes {
            if n as usize >= node_count {
                return Err(MeshError::malformed(format!(
                    "triangle {} references node {} out of range (0..{})",
                    rec.id, n, node_count
                )));
            }
        }
        let mut on_edge = false;
        let mut grains = [EXTERIOR; 2];
        for (slot, &g) in grains.iter_mut().zip(rec.grains.iter()) {
            if g < 0 {
                on_edge = true;
            } else if g > i64::from(num_grains) {
                return Err(MeshError::malformed(format!(
                    "triangle {} references grain {} beyond {} grains",
                    rec.id, g, num_grains
                )));
            } else {
                *slot = g as GrainId;
            }
        }
        if grains[0] == grains[1] {
            return Err(MeshError::malformed(format!(
                "triangle {} has the same grain {} on both sides",
                rec.id, grains[0]
            )));
        }

        let slot = tri_slots.get_mut(rec.id as usize).ok_or_else(|| {
            MeshError::malformed(format!(
                "triangle id {} out of range (0..{})",
                rec.id, tri_count
            ))
        })?;
        if slot.is_some() {
            return Err(MeshError::malformed(format!(
                "duplicate triangle id {}",
                rec.id
            )));
        }
        let mut tri = SurfaceTriangle::new(rec.nodes, grains[0], grains[1]);
        tri.on_edge = on_edge;
        *slot = Some(tri);
    }

    let mut mesh = SurfaceMesh::new(num_grains);
    mesh.nodes = nodes;
    mesh.triangles = tri_slots.into_iter().flatten().collect();

    let degenerate = tri_count - (0..tri_count)
        .filter(|&t| mesh.refresh_triangle(t as u32))
        .count();
    if degenerate > 0 {
        warn!("Skipped {} degenerate input triangles", degenerate);
    }
    mesh.mark_triple_triangles();

    Ok(mesh)
}

/// Load a surface mesh from node and triangle files.
pub fn load_surface(
    nodes_path: &Path,
    triangles_path: &Path,
    num_grains: Option<u32>,
) -> MeshResult<SurfaceMesh> {
    info!("Loading surface mesh from {:?} and {:?}", nodes_path, triangles_path);
    let nodes = parse_nodes(open(nodes_path)?, nodes_path)?;
    let triangles = parse_triangles(open(triangles_path)?, triangles_path)?;
    let mesh = assemble_surface(nodes, triangles, num_grains)?;
    info!(
        "Loaded surface mesh: {} nodes, {} triangles, {} grains",
        mesh.node_count(),
        mesh.triangle_count(),
        mesh.num_grains
    );
    Ok(mesh)
}

fn create(path: &Path) -> MeshResult<BufWriter<File>> {
    let file = File::create(path).map_err(|e| MeshError::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn finish<W: Write>(path: &Path, result: io::Result<()>, mut writer: W) -> MeshResult<()> {
    result
        .and_then(|_| writer.flush())
        .map_err(|e| MeshError::IoWrite {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write seed points for the tessellator: `3`, the count, then coordinates.
pub fn write_points_to<W: Write>(w: &mut W, nodes: &[Node]) -> io::Result<()> {
    writeln!(w, "3")?;
    writeln!(w, "{}", nodes.len())?;
    for node in nodes {
        let p = &node.position;
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    Ok(())
}

pub fn write_points(path: &Path, nodes: &[Node]) -> MeshResult<()> {
    let mut writer = create(path)?;
    let result = write_points_to(&mut writer, nodes);
    finish(path, result, writer)?;
    debug!("Wrote {} seed points to {:?}", nodes.len(), path);
    Ok(())
}

/// Write the volume mesh as a VTK unstructured grid.
///
/// Every node is also emitted as a vertex cell so grain ownership of seeded
/// nodes is visible; tets follow as VTK_TETRA cells.
pub fn write_volume_vtk_to<W: Write>(w: &mut W, mesh: &VolumeMesh) -> io::Result<()> {
    let nodes = mesh.nodes.len();
    let tets: Vec<_> = mesh.live_tets().map(|(_, t)| t).collect();
    let cells = nodes + tets.len();

    writeln!(w, "{}", VTK_HEADER)?;
    writeln!(w, "grain volume mesh")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;
    writeln!(w)?;
    writeln!(w, "POINTS {} float", nodes)?;
    for node in &mesh.nodes {
        let p = &node.position;
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    writeln!(w)?;
    writeln!(w, "CELLS {} {}", cells, nodes * 2 + tets.len() * 5)?;
    for i in 0..nodes {
        writeln!(w, "1 {}", i)?;
    }
    for tet in &tets {
        let [a, b, c, d] = tet.nodes;
        writeln!(w, "4 {} {} {} {}", a, b, c, d)?;
    }
    writeln!(w)?;
    writeln!(w, "CELL_TYPES {}", cells)?;
    for _ in 0..nodes {
        writeln!(w, "1")?;
    }
    for _ in &tets {
        writeln!(w, "10")?;
    }
    writeln!(w)?;
    writeln!(w, "CELL_DATA {}", cells)?;
    writeln!(w, "SCALARS GrainID int 1")?;
    writeln!(w, "LOOKUP_TABLE default")?;
    for node in &mesh.nodes {
        writeln!(w, "{}", node.grain)?;
    }
    for tet in &tets {
        writeln!(w, "{}", tet.class.vtk_id())?;
    }
    writeln!(w)?;
    writeln!(w, "SCALARS DihedralAngle float")?;
    writeln!(w, "LOOKUP_TABLE default")?;
    for _ in 0..nodes {
        writeln!(w, "0")?;
    }
    for tet in &tets {
        let worst = tet.measure.map(|m| m.min_dihedral()).unwrap_or(0.0);
        writeln!(w, "{}", worst as f32)?;
    }
    Ok(())
}

pub fn write_volume_vtk(path: &Path, mesh: &VolumeMesh) -> MeshResult<()> {
    let mut writer = create(path)?;
    let result = write_volume_vtk_to(&mut writer, mesh);
    finish(path, result, writer)?;
    info!(
        "Wrote volume mesh to {:?}: {} nodes, {} tetrahedra",
        path,
        mesh.nodes.len(),
        mesh.live_tet_count()
    );
    Ok(())
}

/// Write the surface mesh as VTK polydata.
///
/// Each live triangle is written twice, once per winding, tagged with the
/// grain that winding faces.
pub fn write_surface_vtk_to<W: Write>(w: &mut W, mesh: &SurfaceMesh) -> io::Result<()> {
    let tris: Vec<_> = mesh.live_triangles().map(|(_, t)| t).collect();
    writeln!(w, "{}", VTK_HEADER)?;
    writeln!(w, "grain surface mesh")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET POLYDATA")?;
    writeln!(w, "POINTS {} float", mesh.nodes.len())?;
    for node in &mesh.nodes {
        let p = &node.position;
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    writeln!(w)?;
    writeln!(w, "POLYGONS {} {}", tris.len() * 2, tris.len() * 8)?;
    for tri in &tris {
        let [a, b, c] = tri.left_winding();
        writeln!(w, "3 {} {} {}", a, b, c)?;
    }
    for tri in &tris {
        let [a, b, c] = tri.right_winding();
        writeln!(w, "3 {} {} {}", a, b, c)?;
    }
    writeln!(w)?;
    writeln!(w, "CELL_DATA {}", tris.len() * 2)?;
    writeln!(w, "SCALARS GrainID int 1")?;
    writeln!(w, "LOOKUP_TABLE default")?;
    for tri in &tris {
        writeln!(w, "{}", tri.left_grain)?;
    }
    for tri in &tris {
        writeln!(w, "{}", tri.right_grain)?;
    }
    Ok(())
}

pub fn write_surface_vtk(path: &Path, mesh: &SurfaceMesh) -> MeshResult<()> {
    let mut writer = create(path)?;
    let result = write_surface_vtk_to(&mut writer, mesh);
    finish(path, result, writer)?;
    debug!("Wrote surface mesh to {:?}", path);
    Ok(())
}

/// Write dihedral-angle and volume-ratio histograms.
///
/// One line per degree: `deg surf  bulk`, with `volsurf volbulk` appended for
/// the first 25 lines.
pub fn write_histograms_to<W: Write>(w: &mut W, report: &QualityReport) -> io::Result<()> {
    for (i, (surf, bulk)) in report
        .dihedral_surface
        .iter()
        .zip(report.dihedral_bulk.iter())
        .enumerate()
    {
        match (report.volume_surface.get(i), report.volume_bulk.get(i)) {
            (Some(vs), Some(vb)) => writeln!(w, "{} {}  {}  {} {}", i, surf, bulk, vs, vb)?,
            _ => writeln!(w, "{} {}  {}", i, surf, bulk)?,
        }
    }
    Ok(())
}

pub fn write_histograms(path: &Path, report: &QualityReport) -> MeshResult<()> {
    let mut writer = create(path)?;
    let result = write_histograms_to(&mut writer, report);
    finish(path, result, writer)?;
    debug!("Wrote histograms to {:?}", path);
    Ok(())
}

/// Write the voxel grid as VTK structured points, x fastest, 20 per line.
pub fn write_voxels_vtk_to<W: Write>(w: &mut W, grid: &VoxelGrid) -> io::Result<()> {
    let [nx, ny, nz] = grid.dims;
    let o = &grid.origin;
    let s = &grid.spacing;
    writeln!(w, "{}", VTK_HEADER)?;
    writeln!(w, "grain voxel grid")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET STRUCTURED_POINTS")?;
    writeln!(w, "DIMENSIONS {} {} {}", nx, ny, nz)?;
    writeln!(w, "ORIGIN {} {} {}", o.x, o.y, o.z)?;
    writeln!(w, "SPACING {} {} {}", s.x, s.y, s.z)?;
    writeln!(w, "POINT_DATA {}", nx * ny * nz)?;
    writeln!(w)?;
    writeln!(w, "SCALARS GrainID int 1")?;
    writeln!(w, "LOOKUP_TABLE default")?;
    let mut written = 0usize;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                write!(w, "       {}", grid.get(i, j, k))?;
                written += 1;
                if written % 20 == 0 {
                    writeln!(w)?;
                }
            }
        }
    }
    if written % 20 != 0 {
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_voxels_vtk(path: &Path, grid: &VoxelGrid) -> MeshResult<()> {
    let mut writer = create(path)?;
    let result = write_voxels_vtk_to(&mut writer, grid);
    finish(path, result, writer)?;
    debug!("Wrote voxel grid to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn p() -> &'static Path {
        Path::new("test.txt")
    }

    #[test]
    fn test_parse_nodes() {
        let text = "2\n0 2 0.0 0.5 1.0\n\n1 3 1 2 3\n";
        let nodes = parse_nodes(Cursor::new(text), p()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].numgrains, 2);
        assert_relative_eq!(nodes[1].position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_parse_nodes_errors() {
        let err = parse_nodes(Cursor::new("2\n0 2 0 0 0\n"), p()).unwrap_err();
        assert!(matches!(err, MeshError::ParseError { .. }));

        let err = parse_nodes(Cursor::new("1\n0 2 0 zero 0\n"), p()).unwrap_err();
        match err {
            MeshError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }

        assert!(parse_nodes(Cursor::new("1\n0 2 0 0\n"), p()).is_err());
    }

    #[test]
    fn test_parse_triangles() {
        let text = "1\n0 0 1 2 5 6 7 3 -1\n";
        let tris = parse_triangles(Cursor::new(text), p()).unwrap();
        assert_eq!(tris[0].nodes, [0, 1, 2]);
        assert_eq!(tris[0].edges, [5, 6, 7]);
        assert_eq!(tris[0].grains, [3, -1]);
    }

    #[test]
    fn test_parse_tets() {
        let tets = parse_tets(Cursor::new("2\n0 1 2 3\n1 2 3 4\n"), p(), 5).unwrap();
        assert_eq!(tets, vec![[0, 1, 2, 3], [1, 2, 3, 4]]);
    }

    #[test]
    fn test_parse_tets_short_file_is_tool_failure() {
        let err = parse_tets(Cursor::new("3\n0 1 2 3\n"), p(), 5).unwrap_err();
        assert!(matches!(err, MeshError::ExternalToolFailure { .. }));
        let err = parse_tets(Cursor::new(""), p(), 5).unwrap_err();
        assert!(matches!(err, MeshError::ExternalToolFailure { .. }));
    }

    #[test]
    fn test_parse_tets_out_of_range() {
        let err = parse_tets(Cursor::new("1\n0 1 2 9\n"), p(), 5).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));
    }

    #[test]
    fn test_read_tets_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_tets(&dir.path().join("tets.txt"), 4).unwrap_err();
        assert!(matches!(err, MeshError::ExternalToolFailure { .. }));
    }

    fn node(id: u32, x: f64, y: f64, z: f64) -> NodeRecord {
        NodeRecord {
            id,
            numgrains: 2,
            position: Point3::new(x, y, z),
        }
    }

    fn tri(id: u32, nodes: [u32; 3], grains: [i64; 2]) -> TriangleRecord {
        TriangleRecord {
            id,
            nodes,
            edges: [0; 3],
            grains,
        }
    }

    #[test]
    fn test_negative_grain_becomes_exterior() {
        let nodes = vec![
            node(0, 0.0, 0.0, 0.0),
            node(1, 1.0, 0.0, 0.0),
            node(2, 0.0, 1.0, 0.0),
        ];
        let mesh = assemble_surface(nodes, vec![tri(0, [0, 1, 2], [2, -1])], None).unwrap();
        let t = &mesh.triangles[0];
        assert_eq!(t.left_grain, 2);
        assert_eq!(t.right_grain, EXTERIOR);
        assert!(t.on_edge);
        assert!(t.is_alive());
        assert_eq!(mesh.num_grains, 2);
    }

    #[test]
    fn test_assemble_reorders_by_id() {
        let nodes = vec![
            node(2, 0.0, 1.0, 0.0),
            node(0, 0.0, 0.0, 0.0),
            node(1, 1.0, 0.0, 0.0),
        ];
        let mesh = assemble_surface(nodes, vec![tri(0, [0, 1, 2], [1, 2])], None).unwrap();
        assert_relative_eq!(mesh.nodes[2].position, Point3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(mesh.triangles[0].geometry.area, 0.5);
    }

    #[test]
    fn test_assemble_rejects_bad_ids() {
        let nodes = || vec![node(0, 0.0, 0.0, 0.0), node(1, 1.0, 0.0, 0.0), node(2, 0.0, 1.0, 0.0)];

        let err = assemble_surface(nodes(), vec![tri(0, [0, 1, 5], [1, 2])], None).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));

        let err = assemble_surface(nodes(), vec![tri(0, [0, 1, 2], [1, 9])], Some(3)).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));

        let err = assemble_surface(nodes(), vec![tri(4, [0, 1, 2], [1, 2])], None).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));

        let mut dup = nodes();
        dup[2].id = 0;
        let err = assemble_surface(dup, vec![], None).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));

        let err = assemble_surface(nodes(), vec![tri(0, [0, 1, 2], [2, 2])], None).unwrap_err();
        assert!(matches!(err, MeshError::MalformedInput { .. }));
    }

    #[test]
    fn test_zero_area_triangle_loaded_killed() {
        let nodes = vec![
            node(0, 0.0, 0.0, 0.0),
            node(1, 1.0, 0.0, 0.0),
            node(2, 2.0, 0.0, 0.0),
        ];
        let mesh = assemble_surface(nodes, vec![tri(0, [0, 1, 2], [1, 2])], None).unwrap();
        assert!(mesh.triangles[0].killed);
    }

    #[test]
    fn test_load_surface_files() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.txt");
        let tris = dir.path().join("triangles.txt");
        std::fs::write(&nodes, "3\n0 2 0 0 0\n1 2 1 0 0\n2 2 0 1 0\n").unwrap();
        std::fs::write(&tris, "1\n0 0 1 2 0 1 2 1 2\n").unwrap();
        let mesh = load_surface(&nodes, &tris, None).unwrap();
        assert_eq!(mesh.live_triangle_count(), 1);

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            load_surface(&missing, &tris, None),
            Err(MeshError::IoRead { .. })
        ));
    }

    #[test]
    fn test_write_points() {
        let nodes = vec![
            Node::surface(Point3::new(0.0, 0.5, 1.0), 2),
            Node::seeded(Point3::new(2.0, 3.0, 4.0), 1),
        ];
        let mut out = Vec::new();
        write_points_to(&mut out, &nodes).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "3\n2\n0 0.5 1\n2 3 4\n");
    }

    #[test]
    fn test_write_surface_vtk() {
        let nodes = vec![
            node(0, 0.0, 0.0, 0.0),
            node(1, 1.0, 0.0, 0.0),
            node(2, 0.0, 1.0, 0.0),
        ];
        let mesh = assemble_surface(nodes, vec![tri(0, [0, 1, 2], [1, 2])], None).unwrap();
        let mut out = Vec::new();
        write_surface_vtk_to(&mut out, &mesh).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("POLYGONS 2 8"));
        assert!(text.contains("3 0 1 2\n3 0 2 1\n"));
        assert!(text.ends_with("LOOKUP_TABLE default\n1\n2\n"));
    }

    /// The `count` lines following the first line starting with `header`.
    fn block<'a>(text: &'a str, header: &str, skip: usize, count: usize) -> Vec<&'a str> {
        let lines: Vec<&str> = text.lines().collect();
        let at = lines
            .iter()
            .position(|l| l.starts_with(header))
            .unwrap_or_else(|| panic!("missing {}", header));
        lines[at + 1 + skip..at + 1 + skip + count].to_vec()
    }

    fn classified_volume() -> VolumeMesh {
        use crate::geometry::TetMeasure;
        use crate::tetmesh::{Classification, Tetrahedron};

        let mut volume = VolumeMesh::default();
        volume.nodes.push(Node::surface(Point3::new(0.0, 0.0, 0.0), 2));
        for (p, grain) in [
            (Point3::new(1.0, 0.0, 0.0), 1),
            (Point3::new(0.0, 1.0, 0.0), 1),
            (Point3::new(0.0, 0.0, 1.0), 2),
            (Point3::new(1.0, 1.0, 1.0), 2),
        ] {
            volume.nodes.push(Node::seeded(p, grain));
        }
        volume.memberships = vec![vec![1]; volume.nodes.len()];
        let mut a = Tetrahedron::new([0, 1, 2, 3]);
        a.class = Classification::Grain(1);
        let mut b = Tetrahedron::new([1, 2, 3, 4]);
        b.class = Classification::Unresolved { ordinal: 0 };
        let mut dead = Tetrahedron::new([0, 1, 2, 4]);
        dead.killed = true;
        volume.tets = vec![a, b, dead];
        for t in 0..2 {
            let pts = volume.tet_points(&volume.tets[t]);
            volume.tets[t].measure = TetMeasure::compute(&pts);
        }
        volume.refresh_tet_flags();
        volume
    }

    #[test]
    fn test_volume_vtk_cells() {
        let volume = classified_volume();
        let mut out = Vec::new();
        write_volume_vtk_to(&mut out, &volume).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("POINTS 5 float\n"));
        assert!(text.contains("CELLS 7 20\n"));
        assert_eq!(
            block(&text, "CELLS", 0, 7),
            ["1 0", "1 1", "1 2", "1 3", "1 4", "4 0 1 2 3", "4 1 2 3 4"]
        );
        assert_eq!(
            block(&text, "CELL_TYPES", 0, 7),
            ["1", "1", "1", "1", "1", "10", "10"]
        );
    }

    #[test]
    fn test_volume_vtk_cell_data() {
        let volume = classified_volume();
        let mut out = Vec::new();
        write_volume_vtk_to(&mut out, &volume).unwrap();
        let text = String::from_utf8(out).unwrap();

        // Node grains (surface nodes carry 0), then the grain and the
        // unresolved sentinel.
        assert_eq!(
            block(&text, "SCALARS GrainID", 1, 7),
            ["0", "1", "1", "2", "2", "1", "-1"]
        );

        let angles: Vec<f64> = block(&text, "SCALARS DihedralAngle", 1, 7)
            .iter()
            .map(|v| v.parse().unwrap())
            .collect();
        assert!(angles[..5].iter().all(|a| *a == 0.0));
        let corner = volume.tets[0].measure.unwrap().min_dihedral();
        let regular = volume.tets[1].measure.unwrap().min_dihedral();
        assert_relative_eq!(angles[5], corner, epsilon = 1e-4);
        assert_relative_eq!(angles[6], regular, epsilon = 1e-4);
        assert_relative_eq!(angles[6], 70.5288, epsilon = 1e-3);
    }

    #[test]
    fn test_histogram_columns() {
        use crate::grains::GrainRegistry;
        use crate::quality::analyze;

        let mut volume = classified_volume();
        let report = analyze(&mut volume, &GrainRegistry::default(), 0.0);
        let mut out = Vec::new();
        write_histograms_to(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();

        let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split_whitespace().collect()).collect();
        assert_eq!(rows.len(), 180);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[0], i.to_string());
            assert_eq!(row.len(), if i < 25 { 5 } else { 3 }, "row {}", i);
        }
        // The corner tet has a surface node, the regular tet is all seeded.
        assert_eq!(rows[54][1], "3");
        assert_eq!(rows[70][2], "6");
    }

    #[test]
    fn test_voxel_vtk_layout() {
        use crate::adjacency::SurfaceAdjacency;
        use crate::config::VoxelOverlap;
        use crate::grains::GrainRegistry;
        use crate::testutil::box_grain;
        use crate::types::Domain;
        use crate::zbuffer::ZBuffer;
        use nalgebra::Vector3;

        let mesh = box_grain();
        let adj = SurfaceAdjacency::build(&mesh);
        let registry = GrainRegistry::build(&mesh, &adj);
        let grain = registry.get(1).unwrap();
        let zb = ZBuffer::build(&mesh, &adj, grain, 20).unwrap();
        let domain = Domain::new(Point3::origin(), Vector3::new(5.0, 3.0, 2.0));
        let mut grid = VoxelGrid::new(&domain, Vector3::new(0.5, 0.5, 0.5));
        grid.stamp_grain(&zb, grain, VoxelOverlap::LastWrite);
        assert_eq!(grid.dims, [10, 6, 4]);

        let mut out = Vec::new();
        write_voxels_vtk_to(&mut out, &grid).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("DIMENSIONS 10 6 4\n"));
        assert!(text.contains("SPACING 0.5 0.5 0.5\n"));

        let data = block(&text, "LOOKUP_TABLE", 0, 12);
        let mut values = Vec::new();
        for line in &data {
            let row: Vec<u32> = line.split_whitespace().map(|v| v.parse().unwrap()).collect();
            assert_eq!(row.len(), 20);
            values.extend(row);
        }
        assert_eq!(values.len(), 240);
        for (n, v) in values.iter().enumerate() {
            let (i, j, k) = (n % 10, (n / 10) % 6, n / 60);
            let inside = i < 4 && j < 2 && k < 2;
            assert_eq!(*v, if inside { 1 } else { 0 }, "voxel {} {} {}", i, j, k);
        }
        assert!(text.ends_with("\n"));
        assert_eq!(text.lines().count(), 11 + 12);
    }
}
