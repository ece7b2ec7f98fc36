pub mod optimade;
