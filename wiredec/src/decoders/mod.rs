pub mod can;
pub mod modbus;
pub mod sdcard;
pub mod uart;
