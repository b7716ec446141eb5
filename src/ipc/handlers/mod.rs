pub mod assessments;
pub mod classes;
pub mod core;
pub mod periods;
pub mod records;
pub mod skills;
pub mod students;
