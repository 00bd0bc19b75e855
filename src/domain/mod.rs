pub mod commands;
pub mod copy;
pub mod errors;
pub mod fine;
pub mod loan;
pub mod policy;
pub mod summary;
pub mod value_objects;

pub use copy::*;
pub use errors::*;
pub use fine::PaymentRecord;
pub use loan::{Loan, LoanStatus};
pub use policy::*;
pub use summary::*;
pub use value_objects::*;
