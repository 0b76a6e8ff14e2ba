pub mod enums;
pub mod invitation;
pub mod medical_code;
pub mod order;
pub mod organization;
pub mod patient;
pub mod relationship;
pub mod session;
pub mod user;

pub use enums::*;
pub use invitation::*;
pub use medical_code::*;
pub use order::*;
pub use organization::*;
pub use patient::*;
pub use relationship::*;
pub use session::*;
pub use user::*;
