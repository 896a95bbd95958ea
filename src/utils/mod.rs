pub trait ResultExt {
    type Ok;
    #[track_caller]
    fn ok_or_log(self) -> Option<Self::Ok>;
}
impl<T, E: Into<anyhow::Error>> ResultExt for Result<T, E> {
    type Ok = T;
    #[track_caller]
    #[inline]
    fn ok_or_log(self) -> Option<T> {
        match self {
            Ok(val) => Some(val),
            Err(err) => {
                log::error!("{:?}", err.into());
                None
            }
        }
    }
}

pub fn lock_mutex<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

pub type UnbTx<T> = tokio::sync::mpsc::UnboundedSender<T>;
pub type UnbRx<T> = tokio::sync::mpsc::UnboundedReceiver<T>;
pub fn unb_chan<T>() -> (UnbTx<T>, UnbRx<T>) {
    tokio::sync::mpsc::unbounded_channel()
}
