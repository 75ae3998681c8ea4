mod interning;
mod modules;
