mod listener;
mod refresh;
mod support;
