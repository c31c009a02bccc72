pub mod lead_time;
pub mod recommender;
pub mod run;
