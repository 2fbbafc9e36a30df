//! # Session Cipher
//!
//! A keyed stream cipher applied to packet bytes.
//!
//! The keystream comes from a 64-bit linear congruential generator whose
//! state advances with every byte processed and persists across calls, so
//! one instance covers one direction of one connection for its lifetime.
//! A connection therefore holds two instances (see [`CipherPair`]), keyed
//! from the same material.
//!
//! Keystream bytes equal to zero are skipped, so every plaintext byte is
//! changed by encryption.
//!
//! Two kinds of key material exist:
//! - [`KeyMaterial::Build`], a fixed per-client-build constant used before
//!   login has produced a session key
//! - [`KeyMaterial::Session`], the first 16 bytes of the SRP6 session key

use crate::error::CipherError;
use std::fmt;

/// Size in bytes of session key material
pub const CIPHER_KEY_LENGTH: usize = 16;

/// Default pre-login key constant, overridden by `buildkey` in the server options
pub const DEFAULT_BUILD_KEY: u64 = 0x5ACE_1A5D_8A2F_3D97;

const MULTIPLIER: u64 = 6364136223846793005;
const BUILD_KEY_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Input to [`PacketCipher::new`]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum KeyMaterial {
    Build(u64),
    Session([u8; CIPHER_KEY_LENGTH]),
}

impl KeyMaterial {
    /// All-zero material is rejected
    pub fn is_valid(&self) -> bool {
        match self {
            KeyMaterial::Build(key) => *key != 0,
            KeyMaterial::Session(key) => key.iter().any(|&b| b != 0),
        }
    }

    /// Initial `(state, increment)` of the generator; the increment is always odd
    fn schedule(&self) -> Result<(u64, u64), CipherError> {
        if !self.is_valid() {
            return Err(CipherError::InvalidKey);
        }

        Ok(match self {
            KeyMaterial::Build(key) => (*key, (key.rotate_left(32) ^ BUILD_KEY_MIX) | 1),
            KeyMaterial::Session(key) => {
                let mut low = [0u8; 8];
                let mut high = [0u8; 8];
                low.copy_from_slice(&key[..8]);
                high.copy_from_slice(&key[8..]);
                (u64::from_le_bytes(low), u64::from_le_bytes(high) | 1)
            }
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Build(_) => f.write_str("KeyMaterial::Build(..)"),
            KeyMaterial::Session(_) => f.write_str("KeyMaterial::Session(..)"),
        }
    }
}

/// One direction of encryption
pub struct PacketCipher {
    state: u64,
    increment: u64,
    block: [u8; 8],
    offset: usize,
    keyed: bool,
}

impl PacketCipher {
    pub fn new(key: KeyMaterial) -> Result<Self, CipherError> {
        let (state, increment) = key.schedule()?;
        Ok(Self {
            state,
            increment,
            block: [0; 8],
            offset: 8,
            keyed: true,
        })
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed
    }

    /// Wipe the key; later calls fail with [`CipherError::InvalidKey`]
    pub fn clear(&mut self) {
        self.state = 0;
        self.increment = 0;
        self.block = [0; 8];
        self.offset = 8;
        self.keyed = false;
    }

    fn next_keystream_byte(&mut self) -> u8 {
        loop {
            if self.offset == self.block.len() {
                self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(self.increment);
                self.block = self.state.to_le_bytes();
                self.offset = 0;
            }

            let byte = self.block[self.offset];
            self.offset += 1;
            if byte != 0 {
                return byte;
            }
        }
    }

    fn apply(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        if !self.keyed {
            return Err(CipherError::InvalidKey);
        }
        for byte in data.iter_mut() {
            *byte ^= self.next_keystream_byte();
        }
        Ok(())
    }

    /// Encrypt in place, advancing the stream
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.apply(data)
    }

    /// Decrypt in place, advancing the stream
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.apply(data)
    }
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher")
            .field("keyed", &self.keyed)
            .finish_non_exhaustive()
    }
}

/// A cipher that may not be active yet
#[derive(Debug, Default)]
pub enum CipherSlot {
    #[default]
    Inactive,
    Active(PacketCipher),
}

impl CipherSlot {
    pub fn new() -> Self {
        Self::Inactive
    }

    /// Key (or re-key) this slot; the stream starts over
    pub fn activate(&mut self, key: KeyMaterial) -> Result<(), CipherError> {
        *self = CipherSlot::Active(PacketCipher::new(key)?);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if let CipherSlot::Active(cipher) = self {
            cipher.clear();
        }
        *self = CipherSlot::Inactive;
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CipherSlot::Active(_))
    }

    fn cipher(&mut self) -> Result<&mut PacketCipher, CipherError> {
        match self {
            CipherSlot::Active(cipher) => Ok(cipher),
            CipherSlot::Inactive => Err(CipherError::InvalidCipher),
        }
    }

    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.cipher()?.encrypt(data)
    }

    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        self.cipher()?.decrypt(data)
    }
}

/// Send and receive ciphers of one connection
#[derive(Debug, Default)]
pub struct CipherPair {
    pub send: CipherSlot,
    pub recv: CipherSlot,
}

impl CipherPair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key both directions from the same material
    pub fn activate(&mut self, key: KeyMaterial) -> Result<(), CipherError> {
        let send = PacketCipher::new(key)?;
        let recv = PacketCipher::new(key)?;
        self.send = CipherSlot::Active(send);
        self.recv = CipherSlot::Active(recv);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.send.deactivate();
        self.recv.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.send.is_active() && self.recv.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SESSION_KEY: [u8; CIPHER_KEY_LENGTH] = [
        0x10, 0x32, 0x54, 0x76, 0x98, 0xba, 0xdc, 0xfe, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
    ];

    fn pair(key: KeyMaterial) -> (PacketCipher, PacketCipher) {
        (PacketCipher::new(key).unwrap(), PacketCipher::new(key).unwrap())
    }

    fn roundtrip(key: KeyMaterial, plaintext: &[u8]) {
        let (mut encrypter, mut decrypter) = pair(key);
        let mut data = plaintext.to_vec();

        encrypter.encrypt(&mut data).unwrap();
        if !plaintext.is_empty() {
            assert_ne!(data, plaintext);
        }
        decrypter.decrypt(&mut data).unwrap();
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_roundtrip_sizes() {
        for key in [KeyMaterial::Session(SESSION_KEY), KeyMaterial::Build(DEFAULT_BUILD_KEY)] {
            roundtrip(key, &[]);
            roundtrip(key, b"forty-two bytes of perfectly ordinary text");
            let large: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
            roundtrip(key, &large);
        }
    }

    #[test]
    fn test_every_byte_changes() {
        let mut cipher = PacketCipher::new(KeyMaterial::Session(SESSION_KEY)).unwrap();
        let plaintext = vec![0u8; 4096];
        let mut data = plaintext.clone();
        cipher.encrypt(&mut data).unwrap();
        assert!(data.iter().all(|&b| b != 0));
    }

    #[test]
    fn test_stream_position_persists() {
        let (mut whole, mut split) = pair(KeyMaterial::Session(SESSION_KEY));
        let mut a = b"hello world, this is one message".to_vec();
        let mut b = a.clone();

        whole.encrypt(&mut a).unwrap();
        let (first, second) = b.split_at_mut(7);
        split.encrypt(first).unwrap();
        split.encrypt(second).unwrap();
        assert_eq!(a, b);

        // The same plaintext encrypted twice does not repeat
        let mut again = b"hello world, this is one message".to_vec();
        whole.encrypt(&mut again).unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn test_different_keys_differ() {
        let mut a = vec![0x55u8; 64];
        let mut b = a.clone();
        PacketCipher::new(KeyMaterial::Session(SESSION_KEY)).unwrap().encrypt(&mut a).unwrap();
        PacketCipher::new(KeyMaterial::Build(DEFAULT_BUILD_KEY)).unwrap().encrypt(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_key_is_invalid() {
        assert_eq!(
            PacketCipher::new(KeyMaterial::Build(0)).unwrap_err(),
            CipherError::InvalidKey
        );
        assert_eq!(
            PacketCipher::new(KeyMaterial::Session([0; CIPHER_KEY_LENGTH])).unwrap_err(),
            CipherError::InvalidKey
        );
    }

    #[test]
    fn test_cleared_cipher_reports_invalid_key() {
        let mut cipher = PacketCipher::new(KeyMaterial::Session(SESSION_KEY)).unwrap();
        cipher.clear();
        assert!(!cipher.is_keyed());

        let mut data = vec![1, 2, 3];
        assert_eq!(cipher.encrypt(&mut data), Err(CipherError::InvalidKey));
        assert_eq!(cipher.decrypt(&mut data), Err(CipherError::InvalidKey));
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_inactive_slot_reports_invalid_cipher() {
        let mut slot = CipherSlot::new();
        let mut data = vec![9; 4];
        assert_eq!(slot.encrypt(&mut data), Err(CipherError::InvalidCipher));

        slot.activate(KeyMaterial::Build(DEFAULT_BUILD_KEY)).unwrap();
        assert!(slot.is_active());
        slot.encrypt(&mut data).unwrap();

        slot.deactivate();
        assert_eq!(slot.decrypt(&mut data), Err(CipherError::InvalidCipher));
    }

    #[test]
    fn test_pair_rekey_restarts_both_directions() {
        let mut server = CipherPair::new();
        let mut client = CipherPair::new();
        server.activate(KeyMaterial::Build(DEFAULT_BUILD_KEY)).unwrap();
        client.activate(KeyMaterial::Build(DEFAULT_BUILD_KEY)).unwrap();

        let mut data = b"accepted".to_vec();
        server.send.encrypt(&mut data).unwrap();
        client.recv.decrypt(&mut data).unwrap();
        assert_eq!(data, b"accepted");

        server.activate(KeyMaterial::Session(SESSION_KEY)).unwrap();
        client.activate(KeyMaterial::Session(SESSION_KEY)).unwrap();

        let mut data = b"in world".to_vec();
        client.send.encrypt(&mut data).unwrap();
        server.recv.decrypt(&mut data).unwrap();
        assert_eq!(data, b"in world");
    }

    #[test]
    fn test_debug_hides_key() {
        let output = format!("{:?}", KeyMaterial::Build(DEFAULT_BUILD_KEY));
        assert_eq!(output, "KeyMaterial::Build(..)");
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_chunking(data in proptest::collection::vec(any::<u8>(), 0..2048), cut in 0usize..2048) {
            let (mut encrypter, mut decrypter) = pair(KeyMaterial::Session(SESSION_KEY));
            let mut buf = data.clone();
            let cut = cut.min(buf.len());

            encrypter.encrypt(&mut buf).unwrap();
            let (first, second) = buf.split_at_mut(cut);
            decrypter.decrypt(first).unwrap();
            decrypter.decrypt(second).unwrap();
            prop_assert_eq!(buf, data);
        }
    }
}
