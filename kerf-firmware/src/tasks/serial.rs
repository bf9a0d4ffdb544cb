//! Host serial link
//!
//! The receive task acts on realtime command bytes the moment they arrive
//! and passes everything else to the protocol loop through [`INBOX`]. The
//! transmit task drains [`OUTBOX`] to the UART.

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::{Read, Write};

use kerf_core::motion::protocol::RealtimeCommand;

use crate::channels::{INBOX, OUTBOX, SYS};

const CHUNK_SIZE: usize = 64;

#[embassy_executor::task]
pub async fn serial_rx_task(mut rx: BufferedUartRx) {
    info!("Serial RX task started");

    let mut buf = [0u8; CHUNK_SIZE];
    let mut stream = [0u8; CHUNK_SIZE];

    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("UART read error: {:?}", e);
                continue;
            }
        };

        let mut len = 0;
        for &byte in &buf[..n] {
            match RealtimeCommand::from_byte(byte) {
                Some(command) => {
                    trace!("Realtime: {:?}", command);
                    command.apply(&SYS);
                }
                // Unassigned extended-ASCII bytes never reach the line stream
                None if byte >= 0x80 => {}
                None => {
                    stream[len] = byte;
                    len += 1;
                }
            }
        }

        if len > 0 {
            let written = INBOX.try_write(&stream[..len]).unwrap_or(0);
            if written < len {
                warn!("Line buffer overrun, dropped {} bytes", len - written);
            }
        }
    }
}

#[embassy_executor::task]
pub async fn serial_tx_task(mut tx: BufferedUartTx) {
    info!("Serial TX task started");

    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = OUTBOX.read(&mut buf).await;
        if let Err(e) = tx.write_all(&buf[..n]).await {
            warn!("UART write error: {:?}", e);
        }
    }
}
