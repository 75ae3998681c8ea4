mod oracles;
mod scanning;
