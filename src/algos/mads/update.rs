//! Mesh update: enlarge on full success, refine on failure, hold on a
//! partial success, following the granular-mesh data model.

use crate::barrier::SuccessType;
use crate::mesh::GranularMesh;
use crate::point::Direction;

/// Apply the mesh-update rule for one iteration's outcome. `direction`, if
/// any, is the displacement that produced the success, used to drive
/// anisotropic enlargement.
pub fn update_mesh(mesh: &mut GranularMesh, success: SuccessType, direction: Option<&Direction>) {
    match success {
        SuccessType::FullSuccess => {
            let zero;
            let dir = match direction {
                Some(d) => d,
                None => {
                    zero = Direction::zeros(mesh.dim());
                    &zero
                }
            };
            mesh.enlarge_delta_frame_size(dir);
        }
        SuccessType::PartialSuccess => {
            // hold: neither enlarge nor refine
        }
        SuccessType::Unsuccessful => {
            mesh.refine_delta_frame_size();
        }
    }
}
