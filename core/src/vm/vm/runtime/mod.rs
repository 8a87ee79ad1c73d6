mod dispatch;
mod exec;
mod handlers;
mod unwind;
