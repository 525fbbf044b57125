mod fs;
mod hash;
mod shp;
mod write;

pub(crate) use fs::*;
pub(crate) use hash::*;
pub(crate) use shp::*;
pub(crate) use write::*;
