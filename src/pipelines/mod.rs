pub mod aggregate;
pub mod budget;
pub mod candidates;
pub mod collaborators;
pub mod coverage;
pub mod external;
pub mod job;
pub mod models;
pub mod reference;
pub mod ribo16s;
pub mod scheduler;
