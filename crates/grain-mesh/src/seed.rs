//! Interior point seeding.

use nalgebra::Point3;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::tetmesh::VolumeMesh;
use crate::zbuffer::ZBuffer;

/// Limits for seeding one grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedParams {
    /// Seeding stops once boundary plus seeded nodes reach this count.
    pub target_nodes: usize,
    /// Random draws before giving up on a grain.
    pub max_attempts: u64,
}

impl From<&PipelineConfig> for SeedParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            target_nodes: config.target_nodes_per_grain,
            max_attempts: config.max_seed_attempts,
        }
    }
}

/// Fill a grain with random interior nodes.
///
/// Candidates are drawn uniformly in the grain's unit box and kept when
/// strictly inside all three height fields, with probability
/// `(2 (0.5 - d))^2` for boundary distance `d`. Returns the number of nodes
/// added to `volume`.
pub fn seed_grain<R: Rng + ?Sized>(
    volume: &mut VolumeMesh,
    zbuffer: &ZBuffer,
    boundary_nodes: usize,
    params: SeedParams,
    rng: &mut R,
) -> usize {
    let grain = zbuffer.grain;
    let mut added = 0;
    let mut attempts = 0u64;

    while boundary_nodes + added < params.target_nodes {
        if attempts >= params.max_attempts {
            warn!(
                "Grain {}: stopped seeding after {} attempts with {} of {} nodes",
                grain,
                attempts,
                boundary_nodes + added,
                params.target_nodes
            );
            break;
        }
        attempts += 1;

        let p = Point3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
        if !zbuffer.contains(&p, true) {
            continue;
        }
        let Some(dist) = zbuffer.boundary_distance(&p) else {
            continue;
        };
        let prob = (2.0 * (0.5 - dist)).powi(2);
        if rng.gen::<f64>() <= prob {
            volume.add_seed(zbuffer.denormalize(&p), grain);
            added += 1;
        }
    }

    debug!("Grain {}: seeded {} nodes in {} draws", grain, added, attempts);
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::SurfaceAdjacency;
    use crate::grains::GrainRegistry;
    use crate::testutil::box_grain;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (VolumeMesh, ZBuffer, usize) {
        let mesh = box_grain();
        let adj = SurfaceAdjacency::build(&mesh);
        let registry = GrainRegistry::build(&mesh, &adj);
        let zb = ZBuffer::build(&mesh, &adj, registry.get(1).unwrap(), 20).unwrap();
        let volume = VolumeMesh::from_surface(&mesh, &adj);
        (volume, zb, adj.nodes_of_grain(1).len())
    }

    #[test]
    fn test_seeds_reach_target_inside_grain() {
        let (mut volume, zb, boundary) = setup();
        let params = SeedParams {
            target_nodes: boundary + 50,
            max_attempts: 1_000_000,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let added = seed_grain(&mut volume, &zb, boundary, params, &mut rng);

        assert_eq!(added, 50);
        assert_eq!(volume.seeded_count(1), 50);
        for (node, membership) in volume.nodes[8..].iter().zip(&volume.memberships[8..]) {
            let p = node.position;
            assert!(p.x > 0.0 && p.x < 2.0);
            assert!(p.y > 0.0 && p.y < 1.0);
            assert!(p.z > 0.0 && p.z < 1.0);
            assert_eq!(membership, &vec![1]);
            assert!(!node.surface);
        }
    }

    #[test]
    fn test_attempt_cap() {
        let (mut volume, zb, boundary) = setup();
        let params = SeedParams {
            target_nodes: 1_000_000,
            max_attempts: 100,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let added = seed_grain(&mut volume, &zb, boundary, params, &mut rng);
        assert!(added <= 100);
    }

    #[test]
    fn test_target_already_met() {
        let (mut volume, zb, boundary) = setup();
        let params = SeedParams {
            target_nodes: boundary,
            max_attempts: 100,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(seed_grain(&mut volume, &zb, boundary, params, &mut rng), 0);
    }

    #[test]
    fn test_deterministic() {
        let params = SeedParams {
            target_nodes: 30,
            max_attempts: 100_000,
        };
        let (mut a, zb, boundary) = setup();
        let (mut b, _, _) = setup();
        seed_grain(&mut a, &zb, boundary, params, &mut StdRng::seed_from_u64(9));
        seed_grain(&mut b, &zb, boundary, params, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.nodes, b.nodes);
    }
}
