pub mod hash;
pub mod util;
