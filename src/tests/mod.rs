mod context;
mod helpers;
