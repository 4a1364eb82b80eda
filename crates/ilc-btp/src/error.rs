use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum BtpError {
        Io(err: String) {
            display("BTP transport error: {}", err)
        }
        HandshakeFailed(reason: String) {
            display("BTP handshake failed: {}", reason)
        }
        HandshakeTimeout {
            display("timed out waiting for AUTH_ACK")
        }
        NotOpen {
            display("session is not open")
        }
        RequestTimeout {
            display("request timed out before a response arrived")
        }
        ConnectionClosed {
            display("connection closed before a response arrived")
        }
        MalformedFrame(reason: String) {
            display("malformed BTP frame: {}", reason)
        }
        MalformedPacket(reason: String) {
            display("malformed ILP packet in BTP payload: {}", reason)
        }
    }
}
