pub mod profile;

pub use profile::{CandidateProfile, ContactInfo, JobPosting};
