pub mod mdl;
pub mod vtf;
