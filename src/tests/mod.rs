mod common;
mod expansion;
mod reading;
