/*!
 * Low-level filesystem primitives (component A)
 */

pub mod copy;
pub mod primitives;

pub use copy::copy_file;
pub use primitives::*;
