//! Shared test fixtures.

use nalgebra::Point3;

use crate::types::{Node, SurfaceMesh, SurfaceTriangle};

/// Axis-aligned box [0,2]x[0,1]x[0,1] as grain 1 against the exterior.
///
/// Left windings face into the box.
pub(crate) fn box_grain() -> SurfaceMesh {
    let mut mesh = SurfaceMesh::new(1);
    for i in 0..8 {
        let p = Point3::new(
            if i & 1 == 0 { 0.0 } else { 2.0 },
            if i & 2 == 0 { 0.0 } else { 1.0 },
            if i & 4 == 0 { 0.0 } else { 1.0 },
        );
        mesh.nodes.push(Node::surface(p, 2));
    }
    let quads = [
        [0, 2, 3, 1], // z = 0
        [4, 5, 7, 6], // z = 1
        [0, 1, 5, 4], // y = 0
        [2, 6, 7, 3], // y = 1
        [0, 4, 6, 2], // x = 0
        [1, 3, 7, 5], // x = 2
    ];
    for [a, b, c, d] in quads {
        let mut first = SurfaceTriangle::new([a, c, b], 1, 0);
        let mut second = SurfaceTriangle::new([a, d, c], 1, 0);
        first.on_edge = true;
        second.on_edge = true;
        mesh.triangles.push(first);
        mesh.triangles.push(second);
    }
    mesh.refresh_all_triangles();
    mesh
}

/// Two boxes [0,1]x[0,1]x[0,1] (grain 1) and [1,2]x[0,1]x[0,1] (grain 2)
/// sharing the face x = 1.
pub(crate) fn two_box_grains() -> SurfaceMesh {
    let mut mesh = SurfaceMesh::new(2);
    for i in 0..12 {
        let x = (i % 3) as f64;
        let y = ((i / 3) % 2) as f64;
        let z = (i / 6) as f64;
        let numgrains = if i % 3 == 1 { 3 } else { 2 };
        mesh.nodes.push(Node::surface(Point3::new(x, y, z), numgrains));
    }
    // Node id for lattice corner (x, y, z).
    let id = |x: u32, y: u32, z: u32| x + 3 * y + 6 * z;

    for (grain, x0) in [(1u32, 0u32), (2, 1)] {
        let x1 = x0 + 1;
        let quads = [
            [id(x0, 0, 0), id(x0, 1, 0), id(x1, 1, 0), id(x1, 0, 0)],
            [id(x0, 0, 1), id(x1, 0, 1), id(x1, 1, 1), id(x0, 1, 1)],
            [id(x0, 0, 0), id(x1, 0, 0), id(x1, 0, 1), id(x0, 0, 1)],
            [id(x0, 1, 0), id(x0, 1, 1), id(x1, 1, 1), id(x1, 1, 0)],
        ];
        for [a, b, c, d] in quads {
            for nodes in [[a, c, b], [a, d, c]] {
                let mut tri = SurfaceTriangle::new(nodes, grain, 0);
                tri.on_edge = true;
                mesh.triangles.push(tri);
            }
        }
    }
    // Outer x faces.
    for (grain, x) in [(1u32, 0u32), (2, 2)] {
        let [a, b, c, d] = [id(x, 0, 0), id(x, 0, 1), id(x, 1, 1), id(x, 1, 0)];
        let windings = if x == 0 {
            [[a, c, b], [a, d, c]]
        } else {
            [[a, b, c], [a, c, d]]
        };
        for nodes in windings {
            let mut tri = SurfaceTriangle::new(nodes, grain, 0);
            tri.on_edge = true;
            mesh.triangles.push(tri);
        }
    }
    // Shared face x = 1, left winding faces into grain 2.
    let [a, b, c, d] = [id(1, 0, 0), id(1, 0, 1), id(1, 1, 1), id(1, 1, 0)];
    mesh.triangles.push(SurfaceTriangle::new([a, c, b], 2, 1));
    mesh.triangles.push(SurfaceTriangle::new([a, d, c], 2, 1));

    mesh.refresh_all_triangles();
    mesh
}
