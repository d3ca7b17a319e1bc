// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field derivation
//!
//! [`evaluate`] writes the value of an expression as a new (or replaced)
//! array on a mesh. [`normalize_velocity`] runs the fixed chain that turns
//! the raw solver velocity into the wind products:
//!
//! | array                     | kind   | value                                   |
//! |---------------------------|--------|-----------------------------------------|
//! | `velocityNormZ`           | scalar | vertical component                      |
//! | `velocityNormXYMag`       | scalar | horizontal speed                        |
//! | `velocityNormXYDirection` | vector | unit horizontal direction, zero if calm |
//! | `velocityNormXYAngle`     | scalar | bearing the wind comes from, [0, 360)   |

use crate::error::Result;
use crate::expr::{Compiled, Expr};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;
use urban_wind_core::{FieldArray, Mesh};

pub use urban_wind_core::io::multiblock::VELOCITY;

pub const VELOCITY_NORM: &str = "velocityNorm";
pub const VELOCITY_NORM_Z: &str = "velocityNormZ";
pub const VELOCITY_NORM_XY: &str = "velocityNormXY";
pub const VELOCITY_NORM_XY_MAG: &str = "velocityNormXYMag";
pub const VELOCITY_NORM_XY_DIRECTION: &str = "velocityNormXYDirection";
pub const VELOCITY_NORM_XY_ANGLE: &str = "velocityNormXYAngle";

/// Arrays kept on the normalized product
pub const DERIVED_ARRAYS: [&str; 4] = [
    VELOCITY_NORM_Z,
    VELOCITY_NORM_XY_MAG,
    VELOCITY_NORM_XY_DIRECTION,
    VELOCITY_NORM_XY_ANGLE,
];

const STAGE: &str = "evaluate";

/// Which attribute set an expression reads from and writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    #[default]
    Point,
    Cell,
}

/// Evaluate `expr` for every point (or cell) of `mesh` and store the result
/// as `name`, replacing any array of that name.
pub fn evaluate(mesh: &mut Mesh, mode: AttributeMode, name: &str, expr: &Expr) -> Result<()> {
    let (attributes, tuples) = match mode {
        AttributeMode::Point => (&mut mesh.point_data, mesh.points.len()),
        AttributeMode::Cell => (&mut mesh.cell_data, mesh.cells.len()),
    };
    attributes.check_length(tuples)?;

    let array = match expr.compile(attributes, STAGE)? {
        Compiled::Scalar(node) => FieldArray::scalar(
            name,
            (0..tuples).into_par_iter().map(|i| node.eval(i)).collect(),
        ),
        Compiled::Vector(node) => FieldArray::vector(
            name,
            (0..tuples).into_par_iter().map(|i| node.eval(i)).collect(),
        ),
    };
    attributes.insert(array);

    match attributes.scalar_range(name) {
        Some(range) => debug!(array = name, ?mode, min = range.min, max = range.max, "Derived {}", expr),
        None => debug!(array = name, ?mode, tuples, "Derived {}", expr),
    }
    Ok(())
}

/// The derivation chain from `velocity`, in dependency order
pub fn velocity_derivations(scale_factor: f64) -> Vec<(&'static str, Expr)> {
    let norm = || Expr::array(VELOCITY_NORM);
    let xy = || Expr::array(VELOCITY_NORM_XY);

    let mut chain = vec![
        (VELOCITY_NORM, Expr::array(VELOCITY) * Expr::number(scale_factor)),
        (VELOCITY_NORM_Z, norm().dot(Expr::k_hat())),
        (
            VELOCITY_NORM_XY,
            norm().dot(Expr::i_hat()) * Expr::i_hat() + norm().dot(Expr::j_hat()) * Expr::j_hat(),
        ),
        (VELOCITY_NORM_XY_MAG, xy().mag()),
        (VELOCITY_NORM_XY_DIRECTION, xy().norm()),
    ];
    chain.extend(bearing_derivations());
    chain
}

/// `velocityNormXYAngle` from `velocityNormXYDirection`, in dependency order
pub fn bearing_derivations() -> [(&'static str, Expr); 3] {
    let dir = || Expr::array(VELOCITY_NORM_XY_DIRECTION);
    let angle = || Expr::array(VELOCITY_NORM_XY_ANGLE);

    // Bearing of the incoming wind: the horizontal direction is negated,
    // measured clockwise from +Y. The raw value lies in [-90, 270].
    let raw_angle = -((-dir().dot(Expr::i_hat())).acos() * Expr::number(180.0 / PI)
        * (-dir().dot(Expr::j_hat())).sign()
        - Expr::number(90.0));

    [
        (VELOCITY_NORM_XY_ANGLE, raw_angle),
        (
            VELOCITY_NORM_XY_ANGLE,
            angle() + Expr::number(360.0) * angle().lt(Expr::number(0.0)),
        ),
        (
            VELOCITY_NORM_XY_ANGLE,
            angle() - Expr::number(360.0) * angle().ge(Expr::number(360.0)),
        ),
    ]
}

/// Derive the wind products from the `velocity` point array, then drop
/// `velocity` and the intermediates.
pub fn normalize_velocity(mesh: &mut Mesh, scale_factor: f64) -> Result<()> {
    mesh.point_data.require_vector("normalize source", VELOCITY)?;

    for (name, expr) in velocity_derivations(scale_factor) {
        evaluate(mesh, AttributeMode::Point, name, &expr)?;
    }
    for name in [VELOCITY, VELOCITY_NORM, VELOCITY_NORM_XY] {
        mesh.point_data.remove(name);
    }
    Ok(())
}
