// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while deriving fields or running the pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid expression '{input}': {reason}")]
    Expression { input: String, reason: String },

    #[error("Cannot evaluate '{expression}': {reason}")]
    TypeMismatch { expression: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Stage '{stage}' failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Core(#[from] urban_wind_core::Error),

    #[error(transparent)]
    Geometry(#[from] urban_wind_geometry::Error),
}

impl Error {
    pub fn stage(stage: &'static str, source: impl Into<Error>) -> Self {
        Error::Stage {
            stage,
            source: Box::new(source.into()),
        }
    }
}
