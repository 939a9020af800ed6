//! Survey design module - sampling design and design-based variances

pub mod design;

pub use design::{Domain, LonelyPsu, RatioEstimate, SurveyDesign};
