pub mod join;
pub mod run;
pub mod summarize;
