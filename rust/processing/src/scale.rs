// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform rescaling of the derived speed arrays

use crate::derive::{evaluate, AttributeMode, VELOCITY_NORM_XY_MAG, VELOCITY_NORM_Z};
use crate::error::Result;
use crate::expr::Expr;
use urban_wind_core::Mesh;

const STAGE: &str = "rescale";

/// Arrays multiplied by [`rescale`]; direction and angle are scale-free
pub const SCALED_ARRAYS: [&str; 2] = [VELOCITY_NORM_XY_MAG, VELOCITY_NORM_Z];

/// Multiply `velocityNormXYMag` and `velocityNormZ` by `factor` in place.
///
/// Both arrays are checked before either is touched, so a missing array
/// leaves the mesh unchanged.
pub fn rescale(mesh: &mut Mesh, factor: f64) -> Result<()> {
    for name in SCALED_ARRAYS {
        mesh.point_data.require_scalar(STAGE, name)?;
    }
    for name in SCALED_ARRAYS {
        let expr = Expr::array(name) * Expr::number(factor);
        evaluate(mesh, AttributeMode::Point, name, &expr)?;
    }
    Ok(())
}
