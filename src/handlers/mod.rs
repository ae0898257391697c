pub(crate) mod matches;
pub(crate) mod tournaments;
