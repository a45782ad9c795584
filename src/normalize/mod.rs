//! Canonical forms for the raw strings a posting page gives us.

mod canonical;
mod locale;
mod salary;

pub use canonical::canonicalize;
pub use locale::is_remote_us;
pub use salary::parse_salary;
