pub(crate) mod harness;

pub(crate) mod logging;
