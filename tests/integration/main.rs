mod common;

mod auth;
mod broadcast;
mod chat;
mod mailbox;
mod notebook;
mod swarm;
mod system;
mod wake;
