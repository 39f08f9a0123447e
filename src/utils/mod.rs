pub mod async_task;

pub mod hash;

pub mod time;

#[cfg(test)]
mod time_test;
