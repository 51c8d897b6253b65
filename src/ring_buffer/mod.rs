//bounded ring buffer
//overwrites the oldest entry when full (freshness bias, never blocks the writer)
//not internally synchronised: the owner keeps it behind its own lock
#[derive(Debug, Clone)]
pub struct RingBuffer<T>{
    buffer: Vec<T>,
    head: usize,  //next write position
    len: usize,
    capacity: usize,
}

impl<T: Copy + Default> RingBuffer<T>{
    //creating a new ring buffer with given capacity
    pub fn new(capacity: usize) -> Self{
        assert!(capacity > 0, "ring buffer capacity must be greater than 0");

        RingBuffer{
            buffer: vec![T::default(); capacity],
            head: 0,
            len: 0,
            capacity,
        }
    }

    //push item to buffer, evicting the oldest when full
    pub fn push(&mut self, item: T){
        self.buffer[self.head] = item;
        self.head = (self.head + 1) % self.capacity;

        if self.len < self.capacity{
            self.len += 1;
        }
    }

    //index of the oldest live entry
    fn tail(&self) -> usize{
        return (self.head + self.capacity - self.len) % self.capacity;
    }

    //oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = T> + '_{
        let tail = self.tail();
        return (0..self.len).map(move |i| self.buffer[(tail + i) % self.capacity]);
    }

    pub fn clear(&mut self){
        self.head = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize{
        return self.len;
    }

    pub fn is_empty(&self) -> bool{
        return self.len == 0;
    }
}

impl RingBuffer<f32>{
    //arithmetic mean of the live entries, 0 when empty
    pub fn mean(&self) -> f32{
        if self.len == 0{
            return 0.0;
        }
        return self.iter().sum::<f32>() / self.len as f32;
    }
}
