pub mod doctor;
pub mod status;
pub mod sync;
pub mod track;
