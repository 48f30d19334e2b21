pub mod prizepicks;
