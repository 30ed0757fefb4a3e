//! # Audio Module
//!
//! Orquestación de reproducción por sesión para Open Groove.
//!
//! El sistema se apoya en tres piezas:
//!
//! ### [`queue`] - Queue Management
//! - Cola ordenada por sesión con cursor de posición actual
//! - Capacidad acotada: los agregados de más se rechazan, nunca se truncan
//! - Registro perezoso y seguro para acceso concurrente entre sesiones
//!
//! ### [`player`] - Playback Controller
//! - Máquina de estados Idle → Connecting → Playing ⇄ Paused por sesión
//! - Encadenado automático al terminar cada track de forma natural
//! - Desconexión por inactividad con periodo de gracia cancelable
//!
//! ### [`sink`] / [`guard`] - Bordes
//! - [`sink::AudioSink`]: la capacidad de salida de audio; códec y
//!   señalización de voz viven del otro lado
//! - [`guard::RequestGuard`]: supresión de comandos duplicados en vuelo
//!
//! Cada sesión se serializa con su propio dominio de exclusión; sesiones
//! distintas avanzan en paralelo sin bloquearse.

pub mod guard;
pub mod player;
pub mod queue;
pub mod sink;
